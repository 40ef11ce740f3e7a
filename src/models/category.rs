//! Category model
//!
//! Categories are flat tags for pins and user interests. Their names are
//! stored title-cased, so "street ART" and "Street Art" are the same category.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pin category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Title-cased unique name
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Create a new Category; the name is normalized on construction.
    pub fn new(name: &str) -> Self {
        Self {
            id: 0, // Will be set by the database
            name: normalize_name(name),
            created_at: Utc::now(),
        }
    }
}

/// Canonical form of a category or board name: trimmed, inner whitespace
/// collapsed, title-cased.
pub fn normalize_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    title_case(&collapsed)
}

/// Title-case a string word by word.
///
/// A letter is upper-cased when it follows a non-letter and lower-cased
/// otherwise, so "o'neil" becomes "O'Neil" and "3d art" becomes "3D Art".
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_letter = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.push(lower_single(c));
            } else {
                out.push(upper_single(c));
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Upper-case a char when it maps to exactly one char ("ß" stays "ß")
fn upper_single(c: char) -> char {
    single(c.to_uppercase()).unwrap_or(c)
}

/// Lower-case a char when it maps to exactly one char ("İ" stays "İ")
fn lower_single(c: char) -> char {
    single(c.to_lowercase()).unwrap_or(c)
}

fn single(mut chars: impl Iterator<Item = char>) -> Option<char> {
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("street art"), "Street Art");
        assert_eq!(title_case("STREET ART"), "Street Art");
        assert_eq!(title_case("o'neil"), "O'Neil");
        assert_eq!(title_case("3d art"), "3D Art");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_title_case_keeps_multi_char_uppercase() {
        assert_eq!(title_case("ß"), "ß");
        assert_eq!(normalize_name("straße"), "Straße");
        assert_eq!(normalize_name("SSx"), "Ssx");
        assert_eq!(normalize_name(&normalize_name("ßx")), normalize_name("ßx"));
        assert_eq!(normalize_name("aİb"), "Aİb");
    }

    #[test]
    fn test_normalize_name_collapses_whitespace() {
        assert_eq!(normalize_name("  home   DECOR "), "Home Decor");
        assert_eq!(Category::new("food and DRINK").name, "Food And Drink");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Normalizing is idempotent and case-insensitive.
        #[test]
        fn normalize_is_idempotent(name in "[a-zA-Z ]{0,30}") {
            let once = normalize_name(&name);
            prop_assert_eq!(normalize_name(&once), once.clone());
            prop_assert_eq!(normalize_name(&name.to_uppercase()), once.clone());
            prop_assert_eq!(normalize_name(&name.to_lowercase()), once);
        }

        /// Idempotent for any Unicode input, including letters whose
        /// upper case is longer than one char.
        #[test]
        fn normalize_is_idempotent_unicode(name in "\\PC{0,20}|[ßŉǰΐİaB ]{0,10}") {
            let once = normalize_name(&name);
            prop_assert_eq!(normalize_name(&once), once);
        }
    }
}
