use crate::types::{EntityId, EntityName, GuardName, SubjectType};
use std::fmt;

/// Kind of a guard-scoped entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntityKind {
    /// A named collection of permissions.
    Module,
    /// An atomic access right.
    Permission,
}

impl EntityKind {
    /// Returns the lowercase kind label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Permission => "permission",
        }
    }

    /// Subject type used when resolving a default guard for this kind.
    pub fn subject_type(self) -> SubjectType {
        SubjectType::from_string(self.as_str().to_string())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common shape of permissions and modules.
pub trait GuardedEntity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Entity kind, used in errors and logs.
    const KIND: EntityKind;

    /// Storage identity.
    fn id(&self) -> EntityId;

    /// Name, unique per guard.
    fn name(&self) -> &EntityName;

    /// Guard the entity belongs to.
    fn guard_name(&self) -> &GuardName;

    /// Builds an entity from stored columns.
    fn from_parts(id: EntityId, name: EntityName, guard_name: GuardName) -> Self;
}

macro_rules! define_entity {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name {
            /// Storage identity.
            pub id: EntityId,
            /// Name, unique per guard.
            pub name: EntityName,
            /// Owning guard.
            pub guard_name: GuardName,
        }

        impl GuardedEntity for $name {
            const KIND: EntityKind = $kind;

            fn id(&self) -> EntityId {
                self.id
            }

            fn name(&self) -> &EntityName {
                &self.name
            }

            fn guard_name(&self) -> &GuardName {
                &self.guard_name
            }

            fn from_parts(id: EntityId, name: EntityName, guard_name: GuardName) -> Self {
                Self {
                    id,
                    name,
                    guard_name,
                }
            }
        }
    };
}

define_entity!(
    /// Guard-scoped atomic access right.
    Permission,
    EntityKind::Permission
);
define_entity!(
    /// Guard-scoped named collection of permissions, assignable to subjects.
    Module,
    EntityKind::Module
);

/// A permission loaded together with the modules that grant it.
///
/// This is the value shape held by the permission cache.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionEntry {
    /// The permission row.
    pub permission: Permission,
    /// Modules linked to the permission at load time.
    pub modules: Vec<Module>,
}

impl PermissionEntry {
    /// Returns true when `module` grants this permission.
    pub fn granted_by(&self, module: EntityId) -> bool {
        self.modules.iter().any(|m| m.id == module)
    }
}
