use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for personal data (customer emails, mostly) that must not leak into logs.
///
/// `Debug` prints a fixed mask, `Display` keeps just enough of an email to tell
/// customers apart in a log line (`j***@example.com`). Serialization is
/// transparent because API responses and gateway payloads need the real value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self.0.as_ref();
        match raw.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                write!(f, "{}***@{}", first, domain)
            }
            None => f.write_str("********"),
        }
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_masked_in_logs() {
        let email = Masked::new("jane.doe@example.com".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(email.to_string(), "j***@example.com");
        assert_eq!(email.expose(), "jane.doe@example.com");
    }

    #[test]
    fn test_non_email_is_fully_masked() {
        let value = Masked::new("not-an-email");
        assert_eq!(value.to_string(), "********");
    }

    #[test]
    fn test_serialization_is_transparent() {
        let email = Masked::new("jane@example.com".to_string());
        assert_eq!(serde_json::to_string(&email).unwrap(), "\"jane@example.com\"");
    }
}
