//! In-memory entry model.
//!
//! Every key maps to one [`Entry`]: the raw value text, the type it was
//! classified as when written, and an optional absolute expiry instant in
//! unix seconds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in unix seconds.
#[inline]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The type a value was classified as when it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    String,
    Object,
    Array,
}

impl ValueType {
    /// Classifies a raw value.
    ///
    /// Tried in priority order: integer literal, JSON object, JSON array.
    /// Anything else is a string.
    pub fn classify(value: &str) -> Self {
        if value.parse::<i64>().is_ok() {
            return ValueType::Int;
        }

        if value.starts_with('{')
            && value.ends_with('}')
            && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(value).is_ok()
        {
            return ValueType::Object;
        }

        if value.starts_with('[')
            && value.ends_with(']')
            && serde_json::from_str::<Vec<serde_json::Value>>(value).is_ok()
        {
            return ValueType::Array;
        }

        ValueType::String
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::String => "string",
            ValueType::Object => "object",
            ValueType::Array => "array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value with optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The value exactly as the client sent it
    pub value: String,
    /// Classification of `value`
    pub value_type: ValueType,
    /// Absolute expiry in unix seconds (None = never expires)
    pub expire_at: Option<i64>,
}

impl Entry {
    /// Creates an entry without expiry, classifying the value.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let value_type = ValueType::classify(&value);
        Self {
            value,
            value_type,
            expire_at: None,
        }
    }

    /// Creates an entry that expires at the given unix second.
    pub fn with_expire_at(value: impl Into<String>, expire_at: i64) -> Self {
        Self {
            expire_at: Some(expire_at),
            ..Self::new(value)
        }
    }

    /// An entry whose expiry instant has been reached is logically deleted.
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expire_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Remaining lifetime in seconds, or None if the entry never expires.
    pub fn ttl_at(&self, now: i64) -> Option<i64> {
        self.expire_at.map(|exp| exp.saturating_sub(now).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(ValueType::classify("123"), ValueType::Int);
        assert_eq!(ValueType::classify("-7"), ValueType::Int);
        assert_eq!(ValueType::classify(r#"{"a":1}"#), ValueType::Object);
        assert_eq!(ValueType::classify("[1,2,3]"), ValueType::Array);
        assert_eq!(ValueType::classify("hello"), ValueType::String);
        assert_eq!(ValueType::classify("12.5"), ValueType::String);
        assert_eq!(ValueType::classify("{broken"), ValueType::String);
        assert_eq!(ValueType::classify("[1,"), ValueType::String);
        // a JSON array is not an object even though it parses as JSON
        assert_eq!(ValueType::classify("[]"), ValueType::Array);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ValueType::Int.to_string(), "int");
        assert_eq!(ValueType::Object.as_str(), "object");
        assert_eq!(serde_json::to_string(&ValueType::Array).unwrap(), "\"array\"");
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = Entry::with_expire_at("v", 100);
        assert!(!entry.is_expired_at(99));
        assert!(entry.is_expired_at(100));
        assert_eq!(entry.ttl_at(95), Some(5));
        assert_eq!(entry.ttl_at(120), Some(0));

        let forever = Entry::new("v");
        assert!(!forever.is_expired_at(i64::MAX));
        assert_eq!(forever.ttl_at(0), None);
    }
}
