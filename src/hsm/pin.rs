use std::fmt;
use std::str::FromStr;

use crate::error::SignerError;

/// Crypto-user credentials in the `<username>:<password>` form the token
/// expects as its login PIN.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPin {
    username: String,
    password: String,
}

impl UserPin {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The PIN string handed to `C_Login`.
    pub fn login_pin(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

impl FromStr for UserPin {
    type Err = SignerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (username, password) = value.split_once(':').ok_or_else(|| {
            SignerError::Authentication("PIN must have the form <username>:<password>".to_string())
        })?;

        if username.is_empty() || password.is_empty() {
            return Err(SignerError::Authentication(
                "PIN username and password must not be empty".to_string(),
            ));
        }

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for UserPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
