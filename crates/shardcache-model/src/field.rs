//! Three-state field presence for partial update payloads.
//!
//! Update notifications only carry the fields that changed. A field can be
//! missing from the payload (keep the stored value), explicitly `null`
//! (clear the stored value), or present with a new value.
//!
//! Use with `#[serde(default, skip_serializing_if = "Field::is_unset")]` so
//! that a missing key deserializes to [`Field::Unset`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A field of a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Absent from the payload.
    Unset,
    /// Present as `null`.
    Null,
    /// Present with a value.
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unset
    }
}

impl<T> Field<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    /// The value, if present.
    pub fn value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Merge over a nullable stored value.
    ///
    /// `Unset` keeps `current`, `Null` clears it, `Value` replaces it.
    pub fn merge(self, current: Option<T>) -> Option<T> {
        match self {
            Field::Unset => current,
            Field::Null => None,
            Field::Value(v) => Some(v),
        }
    }

    /// Merge over a required stored value. `Null` cannot clear it.
    pub fn merge_required(self, current: T) -> T {
        match self {
            Field::Value(v) => v,
            Field::Unset | Field::Null => current,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Null,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => serializer.serialize_some(v),
            Field::Unset | Field::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Patch {
        #[serde(default, skip_serializing_if = "Field::is_unset")]
        nick: Field<String>,
    }

    #[test]
    fn test_missing_key_is_unset() {
        let patch: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.nick, Field::Unset);
    }

    #[test]
    fn test_null_and_value() {
        let patch: Patch = serde_json::from_str(r#"{"nick":null}"#).unwrap();
        assert_eq!(patch.nick, Field::Null);

        let patch: Patch = serde_json::from_str(r#"{"nick":"neo"}"#).unwrap();
        assert_eq!(patch.nick, Field::Value("neo".to_string()));
    }

    #[test]
    fn test_unset_is_skipped_on_serialize() {
        let json = serde_json::to_string(&Patch { nick: Field::Unset }).unwrap();
        assert_eq!(json, "{}");
        let json = serde_json::to_string(&Patch { nick: Field::Null }).unwrap();
        assert_eq!(json, r#"{"nick":null}"#);
    }

    #[test]
    fn test_merge_rules() {
        let current = Some("old".to_string());
        assert_eq!(Field::Unset.merge(current.clone()), current);
        assert_eq!(Field::<String>::Null.merge(current.clone()), None);
        assert_eq!(
            Field::Value("new".to_string()).merge(current),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_merge_required_ignores_null() {
        assert_eq!(Field::Null.merge_required(5u64), 5);
        assert_eq!(Field::Unset.merge_required(5u64), 5);
        assert_eq!(Field::Value(9).merge_required(5u64), 9);
    }
}
