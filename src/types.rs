use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;

const MAX_NAME_LEN: usize = 128;
const MAX_ENTITY_NAME_LEN: usize = 255;

fn validate_simple_name(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidId(format!("{kind} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::InvalidId(format!(
            "{kind} length must be <= {MAX_NAME_LEN}"
        )));
    }
    if !trimmed.chars().all(is_allowed_name_char) {
        return Err(Error::InvalidId(format!(
            "{kind} contains invalid characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn is_allowed_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-' | '.')
}

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Creates a validated identifier.
            pub fn new(value: impl AsRef<str>) -> Result<Self> {
                validate_simple_name(value.as_ref(), $kind).map(Self)
            }

            /// Creates an identifier from a trusted string without validation.
            pub fn from_string(value: String) -> Self {
                Self(value)
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from_string(value)
            }
        }
    };
}

define_id_type!(
    /// Name of an authentication context (guard).
    GuardName,
    "guard name"
);
define_id_type!(
    /// Type tag of a subject, the owner-type half of [`SubjectKey`].
    SubjectType,
    "subject type"
);
define_id_type!(
    /// Identifier of a subject within its type.
    SubjectId,
    "subject id"
);

/// Name of a permission or module.
///
/// Unlike guard and subject identifiers, entity names may contain spaces and
/// a literal `|`; only control characters are rejected.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EntityName(String);

impl EntityName {
    /// Creates a validated entity name.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidName("name must not be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_ENTITY_NAME_LEN {
            return Err(Error::InvalidName(format!(
                "name length must be <= {MAX_ENTITY_NAME_LEN}"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(Error::InvalidName(
                "name contains control characters".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Creates a name from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for EntityName {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<String> for EntityName {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

/// Storage identity of a permission or module.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EntityId(u64);

impl EntityId {
    /// Wraps a raw storage id.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw storage id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Composite owner key of the polymorphic subject association tables.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubjectKey {
    /// Owner type tag.
    pub subject_type: SubjectType,
    /// Owner id within the type.
    pub id: SubjectId,
}

impl SubjectKey {
    /// Creates a key from already validated parts.
    pub fn new(subject_type: SubjectType, id: SubjectId) -> Self {
        Self { subject_type, id }
    }

    /// Creates a key from raw `subject_type` and `id` segments.
    ///
    /// Both segments are validated by their identifier types.
    pub fn try_from_parts(subject_type: impl AsRef<str>, id: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            subject_type: SubjectType::new(subject_type)?,
            id: SubjectId::new(id)?,
        })
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.subject_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_key_try_from_parts_success() {
        let key = SubjectKey::try_from_parts("user", "42").expect("subject key");
        assert_eq!(key.subject_type.as_str(), "user");
        assert_eq!(key.to_string(), "user#42");
    }

    #[test]
    fn subject_key_try_from_parts_rejects_empty_segment() {
        let err = SubjectKey::try_from_parts("user", "   ").expect_err("must reject");
        assert!(err.to_string().contains("subject id"));
    }

    #[test]
    fn guard_name_rejects_invalid_chars() {
        let err = GuardName::try_from("we b").expect_err("must reject");
        assert!(err.to_string().contains("guard name"));
    }

    #[test]
    fn entity_name_allows_pipes_and_spaces() {
        let name = EntityName::try_from("  edit | publish ").unwrap();
        assert_eq!(name.as_str(), "edit | publish");
    }

    #[test]
    fn entity_name_limit_counts_chars() {
        let accented = "é".repeat(MAX_ENTITY_NAME_LEN);
        assert!(EntityName::new(&accented).is_ok());
        assert!(EntityName::new(format!("{accented}é")).is_err());
    }

    #[test]
    fn entity_name_rejects_control_chars() {
        let result = EntityName::try_from("edit\u{0007}");
        assert!(matches!(result, Err(Error::InvalidName(_))));
    }
}
