//! Stateless signed tokens for emailed links
//!
//! Account activation and password reset links carry a base64url-encoded
//! user id and a token of the form `{timestamp_base36}-{hmac_hex}`. The MAC
//! covers the user's id, email, password hash and activation flag, so a token
//! stops working as soon as it has been used to change any of them.

use chrono::Utc;
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

/// Number of MAC bytes kept in a token
const MAC_LEN: usize = 16;

/// What a token may be used for. Each purpose has its own MAC domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

impl TokenPurpose {
    fn salt(&self) -> &'static str {
        match self {
            TokenPurpose::Activation => "cyclone.account-activation",
            TokenPurpose::PasswordReset => "cyclone.password-reset",
        }
    }
}

/// Issues and checks tokens for one purpose.
#[derive(Clone)]
pub struct TokenGenerator {
    secret: Vec<u8>,
    purpose: TokenPurpose,
    valid_secs: i64,
}

impl TokenGenerator {
    pub fn new(secret: &str, purpose: TokenPurpose, valid_days: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            purpose,
            valid_secs: valid_days * 24 * 60 * 60,
        }
    }

    /// Token for `user`, stamped with the current time
    pub fn make_token(&self, user: &User) -> String {
        self.make_token_at(user, Utc::now().timestamp())
    }

    fn make_token_at(&self, user: &User, timestamp: i64) -> String {
        let mac = self.mac(user, timestamp).finalize().into_bytes();
        format!(
            "{}-{}",
            to_base36(timestamp.max(0) as u64),
            HEXLOWER.encode(&mac[..MAC_LEN])
        )
    }

    /// Check a token against the user's current state
    pub fn check_token(&self, user: &User, token: &str) -> bool {
        self.check_token_at(user, token, Utc::now().timestamp())
    }

    fn check_token_at(&self, user: &User, token: &str, now: i64) -> bool {
        let Some((ts_part, mac_part)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts_part) else {
            return false;
        };
        let Ok(tag) = HEXLOWER.decode(mac_part.as_bytes()) else {
            return false;
        };
        if tag.len() != MAC_LEN {
            return false;
        }
        let Ok(timestamp) = i64::try_from(timestamp) else {
            return false;
        };
        let Some(age) = now.checked_sub(timestamp) else {
            return false;
        };
        if age > self.valid_secs || timestamp > now.saturating_add(60) {
            return false;
        }
        self.mac(user, timestamp).verify_truncated_left(&tag).is_ok()
    }

    fn mac(&self, user: &User, timestamp: i64) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        };
        mac.update(self.purpose.salt().as_bytes());
        mac.update(
            format!(
                "{}|{}|{}|{}|{}",
                user.id, user.email, user.password_hash, user.is_active, timestamp
            )
            .as_bytes(),
        );
        mac
    }
}

/// Encode a user id for use in a URL path segment
pub fn encode_uid(user_id: i64) -> String {
    BASE64URL_NOPAD.encode(user_id.to_string().as_bytes())
}

/// Decode a URL user id; `None` for anything malformed
pub fn decode_uid(uid: &str) -> Option<i64> {
    let bytes = BASE64URL_NOPAD.decode(uid.as_bytes()).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}
