//! AniDB credentials and the login target
//!
//! The password is held in a [`SecureString`] that is zeroed on drop and never
//! printed by `Debug` or `Display`.

use crate::error::{Result, ValidationError};
use std::fmt;
use zeroize::Zeroize;

/// A string that zeros its memory when dropped
#[derive(Clone, Zeroize)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Borrow the secret for the one place that must send it
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Everything `Login` needs: who, and where
#[derive(Debug, Clone)]
pub struct LoginTarget {
    pub username: String,
    pub password: SecureString,
    pub host: String,
    pub port: u16,
    pub client_port: u16,
}

impl LoginTarget {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<SecureString>,
        host: impl Into<String>,
        port: u16,
        client_port: u16,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port,
            client_port,
        }
    }

    /// Reject missing credentials or host before any network activity
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::missing_credentials("username").into());
        }
        if self.password.is_empty() {
            return Err(ValidationError::missing_credentials("password").into());
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::missing_credentials("host").into());
        }
        if self.port == 0 {
            return Err(ValidationError::invalid_configuration("AniDB port must not be 0").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_secure_string_never_prints() {
        let secret = SecureString::new("hunter2");
        assert_eq!(format!("{secret:?}"), "SecureString(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose_secret(), "hunter2");
    }

    #[test]
    fn test_login_target_debug_masks_password() {
        let target = LoginTarget::new("user", "hunter2", "api.anidb.net", 9000, 4556);
        let debug = format!("{target:?}");
        assert!(!debug.contains("hunter2"));
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let cases = [
            LoginTarget::new("", "p", "h", 9000, 4556),
            LoginTarget::new("u", "", "h", 9000, 4556),
            LoginTarget::new("u", "p", " ", 9000, 4556),
            LoginTarget::new("u", "p", "h", 0, 4556),
        ];
        for target in cases {
            assert!(matches!(target.validate(), Err(Error::Validation(_))));
        }
    }
}
