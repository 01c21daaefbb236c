use serde::Deserialize;
use std::fmt;

/// Registry token that renders as "<REDACTED, length n>" in logs and debug output.
#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    #[cfg(test)]
    pub fn new(s: impl Into<String>) -> Self {
        SecretString(s.into())
    }

    /// Only for handing the token to the runtime.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<REDACTED, length {}>", self.0.len())
    }
}
