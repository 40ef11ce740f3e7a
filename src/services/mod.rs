//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, ownership checks, token handling, uploads and outbound mail.

pub mod access;
pub mod board;
pub mod category;
pub mod mail;
pub mod password;
pub mod pin;
pub mod token;
pub mod uploads;
pub mod user;
pub mod validation;

pub use access::{authorize, Access, Owned, Policy};
pub use board::{BoardDetail, BoardService, BoardServiceError};
pub use category::{CategoryService, CategoryServiceError};
pub use mail::{mailer_from_config, MailJob, MailQueue, Mailer};
pub use password::{hash_password, verify_password};
pub use pin::{PinDetail, PinService, PinServiceError};
pub use token::{TokenGenerator, TokenPurpose};
pub use uploads::{IncomingFile, UploadError, UploadStore};
pub use user::{
    ChangePasswordInput, Connections, LoginInput, ProfilePage, RegisterInput, SetPasswordInput,
    UserService, UserServiceError,
};
pub use validation::FieldErrors;
