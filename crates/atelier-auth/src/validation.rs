use std::sync::LazyLock;

use atelier_common::{Error, Result};
use regex::Regex;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles"));

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 512;
const MAX_NAME_LEN: usize = 128;

/// Input validation for registration and login payloads. Everything here
/// runs before any query executes.
pub struct InputValidator;

impl InputValidator {
    pub fn validate_email(email: &str) -> Result<()> {
        if email.is_empty() {
            return Err(Error::Validation("email cannot be empty".into()));
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(Error::Validation("email too long".into()));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(Error::Validation("email is not well-formed".into()));
        }
        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<()> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if password.len() > MAX_PASSWORD_LEN {
            return Err(Error::Validation("password too long".into()));
        }
        Ok(())
    }

    pub fn validate_display_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("display name cannot be empty".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(Error::Validation("display name too long".into()));
        }
        Ok(())
    }
}
