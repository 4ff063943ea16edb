use crate::types::{GuardName, SubjectType};

/// A configured guard and the subject type it authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct GuardDefinition {
    /// Guard name.
    pub name: GuardName,
    /// Subject type provided by this guard.
    pub subject_type: SubjectType,
}

impl GuardDefinition {
    /// Creates a guard definition.
    pub fn new(name: GuardName, subject_type: SubjectType) -> Self {
        Self { name, subject_type }
    }
}

/// Guard configuration: the system default plus every configured guard.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct GuardConfig {
    /// Guard used when no configured guard matches a subject type.
    pub default_guard: GuardName,
    /// Guards in priority order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub guards: Vec<GuardDefinition>,
}

impl GuardConfig {
    /// Creates a configuration with only a default guard.
    pub fn new(default_guard: GuardName) -> Self {
        Self {
            default_guard,
            guards: Vec::new(),
        }
    }

    /// Adds a guard for a subject type.
    pub fn guard(mut self, name: GuardName, subject_type: SubjectType) -> Self {
        self.guards.push(GuardDefinition::new(name, subject_type));
        self
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new(GuardName::from_string("web".to_string()))
    }
}

/// Maps subject types to guard names.
#[derive(Debug, Clone)]
pub struct GuardResolver {
    config: GuardConfig,
}

impl GuardResolver {
    /// Creates a resolver over a guard configuration.
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Returns the system default guard.
    pub fn default_guard(&self) -> &GuardName {
        &self.config.default_guard
    }

    /// Returns the guard used when a lookup for `subject_type` names none.
    ///
    /// This is the first configured guard for the subject type, or the system
    /// default guard when none matches.
    pub fn default_guard_for(&self, subject_type: &SubjectType) -> GuardName {
        self.matching(subject_type)
            .next()
            .cloned()
            .unwrap_or_else(|| self.config.default_guard.clone())
    }

    /// Returns every guard a subject of `subject_type` may hold entities from.
    ///
    /// Never empty: falls back to the default guard alone.
    pub fn guard_names_for(&self, subject_type: &SubjectType) -> Vec<GuardName> {
        let names: Vec<GuardName> = self.matching(subject_type).cloned().collect();
        if names.is_empty() {
            vec![self.config.default_guard.clone()]
        } else {
            names
        }
    }

    fn matching<'a>(
        &'a self,
        subject_type: &'a SubjectType,
    ) -> impl Iterator<Item = &'a GuardName> + 'a {
        self.config
            .guards
            .iter()
            .filter(move |guard| &guard.subject_type == subject_type)
            .map(|guard| &guard.name)
    }
}
