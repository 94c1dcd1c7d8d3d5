//! Client-input checks run before anything touches the store.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ApiError, ApiResult, AuthErrorCode};

pub const PASSWORD_MIN_LEN: usize = 8;
pub const USERNAME_MAX_LEN: usize = 30;

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern is valid"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"))
}

pub fn is_valid_username(username: &str) -> bool {
    username.len() <= USERNAME_MAX_LEN && username_re().is_match(username)
}

/// At least 8 characters with an uppercase letter, a digit and a symbol.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= PASSWORD_MIN_LEN
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email)
}

pub fn check_username(username: &str) -> ApiResult<()> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Username may only contain letters, numbers and underscores".to_string(),
        ))
    }
}

pub fn check_password(password: &str) -> ApiResult<()> {
    if is_strong_password(password) {
        Ok(())
    } else {
        Err(ApiError::Auth(AuthErrorCode::WeakPassword))
    }
}

pub fn check_email(email: &str) -> ApiResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ApiError::Auth(AuthErrorCode::InvalidEmail))
    }
}

pub fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Trims, drops empties and de-duplicates case-insensitively, keeping order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_charset() {
        assert!(is_valid_username("john_doe1"));
        assert!(is_valid_username("A"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("john doe!"));
        assert!(!is_valid_username("john.doe"));
        assert!(!is_valid_username("jöhn"));
        assert!(!is_valid_username(&"a".repeat(USERNAME_MAX_LEN + 1)));
    }

    #[test]
    fn password_strength() {
        assert!(is_strong_password("Abcdef1!"));
        assert!(!is_strong_password("abcdefgh"));
        assert!(!is_strong_password("Abcdef1"));
        assert!(!is_strong_password("abcdef1!"));
        assert!(!is_strong_password("Abcdefg!"));
        assert!(!is_strong_password("Abcdefg1"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ana@mangrov.app"));
        assert!(!is_valid_email("ana@mangrov"));
        assert!(!is_valid_email("ana mangrov.app"));
    }

    #[test]
    fn required_fields() {
        assert!(require("Title", "Bike").is_ok());
        assert!(require("Title", "   ").is_err());
    }

    #[test]
    fn tags_are_normalized() {
        let tags = vec![" Eco ".to_string(), "eco".to_string(), "".to_string(), "Art".to_string()];
        assert_eq!(normalize_tags(&tags), vec!["eco", "art"]);
    }
}
