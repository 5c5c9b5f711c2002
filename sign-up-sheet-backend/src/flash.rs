use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
    Notice,
}

/// A one-shot message for the next page the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Notice,
            message: message.into(),
        }
    }

    /// Form encoding never produces `;`, `,`, `"` or whitespace, so the result is a valid
    /// cookie value as is.
    pub fn to_cookie_value(&self) -> Result<String, AppError> {
        Ok(serde_urlencoded::to_string(self)?)
    }

    #[must_use]
    pub fn from_cookie_value(value: &str) -> Option<Self> {
        serde_urlencoded::from_str(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_value_survives_punctuation() {
        let flash = Flash::error("You've already signed up for a topic!");
        let value = flash.to_cookie_value().unwrap();
        assert!(!value.contains(' '));
        assert!(!value.contains(';'));
        assert_eq!(Flash::from_cookie_value(&value), Some(flash));
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        assert_eq!(Flash::from_cookie_value("kind=shouting&message=hi"), None);
        assert_eq!(Flash::from_cookie_value("message=hi"), None);
    }
}
