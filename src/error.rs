use crate::model::EntityKind;
use crate::types::{EntityId, GuardName};
use std::fmt;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The reference a failed lookup was made with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// Lookup by name.
    Name(String),
    /// Lookup by storage id.
    Id(EntityId),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "named `{name}`"),
            Self::Id(id) => write!(f, "with id `{id}`"),
        }
    }
}

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// Cache store error wrapper.
    #[error("cache store error: {0}")]
    Cache(#[source] StoreError),
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid permission or module name.
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// No row matched the lookup for the given guard.
    #[error("There is no {kind} {key}.")]
    NotFound { kind: EntityKind, key: LookupKey },
    /// Strict create collided with an existing name and guard pair.
    #[error("A `{kind}` already exists for name `{name}` and guard `{guard}`.")]
    AlreadyExists {
        kind: EntityKind,
        name: String,
        guard: GuardName,
    },
    /// Entity guard is not in the querying holder's guard set.
    #[error(
        "The given module or permission should use guard `{}` instead of `{given}`.",
        join_guards(expected)
    )]
    GuardMismatch {
        given: GuardName,
        expected: Vec<GuardName>,
    },
}

impl Error {
    /// Returns true for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found_name(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: LookupKey::Name(name.into()),
        }
    }

    pub(crate) fn not_found_id(kind: EntityKind, id: EntityId) -> Self {
        Self::NotFound {
            kind,
            key: LookupKey::Id(id),
        }
    }
}

fn join_guards(guards: &[GuardName]) -> String {
    guards
        .iter()
        .map(GuardName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}
