//! Validated identifiers for terminals and release tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DepotError, Result};

/// Check a path segment against the identifier charset.
///
/// Accepts ASCII letters, digits, `.`, `-` and `_`. The bare segment `.` and
/// any value containing `..` are rejected even though their characters are
/// allowed, so a valid identifier can always be joined onto a directory
/// without escaping it.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DepotError::validation(field, "must not be empty"));
    }
    if value == "." || value.contains("..") {
        return Err(DepotError::validation(
            field,
            format!("'{value}' must not be or contain a relative path segment"),
        ));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
    {
        return Err(DepotError::validation(
            field,
            format!("'{value}' contains disallowed character {bad:?}"),
        ));
    }
    Ok(())
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                validate_identifier($field, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = DepotError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DepotError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier!(
    /// Names a consumer of deployment artifacts.
    TerminalId,
    "terminal id"
);

identifier!(
    /// Names a release within a terminal's namespace.
    Tag,
    "tag"
);

impl Tag {
    /// Parse a tag that may carry a trailing `.zip` (any case).
    pub fn from_file_name(value: &str) -> Result<Self> {
        let stem = match value.len().checked_sub(4) {
            Some(cut) if value.is_char_boundary(cut) && value[cut..].eq_ignore_ascii_case(".zip") => {
                &value[..cut]
            }
            _ => value,
        };
        Self::new(stem)
    }

    /// Archive file name for this tag, e.g. `v1.2.zip`.
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.0)
    }
}
