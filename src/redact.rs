//! Secret redaction for keys, passwords and connection strings.
//!
//! [`Redacted`] never exposes the wrapped value through `Debug`, `Display`
//! or `Serialize`. Code that needs the secret calls [`Redacted::expose`].

use std::fmt::{self, Debug, Display};

const REDACTED: &str = "<redacted>";

/// Wrapper that prints `<redacted>` in logs, errors and JSON.
///
/// ```
/// use bridge_relay::redact::Redacted;
///
/// let key = Redacted("0xdeadbeef".to_string());
/// assert_eq!(format!("{:?}", key), "<redacted>");
/// assert_eq!(key.expose(), "0xdeadbeef");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        REDACTED.serialize(serializer)
    }
}

impl<T> From<T> for Redacted<T> {
    fn from(value: T) -> Self {
        Redacted(value)
    }
}
