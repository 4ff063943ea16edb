//! Request gating on top of the membership checks.
//!
//! Host integrations turn a [`Requirement`] check into either success or an
//! [`Unauthorized`] rejection. Required names stay on the rejection for
//! logging and only reach its message when the matching display toggle in
//! [`Config`] is enabled.

use crate::config::Config;
use crate::error::Error;
use crate::membership::{Subject, parse_pipe_list};
use crate::registrar::Registrar;
use crate::store::Store;

/// What a rejected request was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    /// One of a set of modules.
    Modules,
    /// One of a set of permissions.
    Permissions,
    /// One of a set of modules or permissions.
    ModulesOrPermissions,
    /// An authenticated subject.
    Authentication,
}

/// 403 rejection raised by the gating layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Unauthorized {
    kind: RequirementKind,
    required: Vec<String>,
    message: String,
}

impl Unauthorized {
    /// HTTP status carried by every rejection.
    pub const STATUS: u16 = 403;

    /// Rejection for a subject holding none of `modules`.
    pub fn for_modules(modules: Vec<String>, config: &Config) -> Self {
        let message = if config.display_module_in_exception {
            format!(
                "User does not have the right modules. Necessary modules are {}",
                modules.join(", ")
            )
        } else {
            "User does not have the right modules.".to_string()
        };
        Self {
            kind: RequirementKind::Modules,
            required: modules,
            message,
        }
    }

    /// Rejection for a subject holding none of `permissions`.
    pub fn for_permissions(permissions: Vec<String>, config: &Config) -> Self {
        let message = if config.display_permission_in_exception {
            format!(
                "User does not have the right permissions. Necessary permissions are {}",
                permissions.join(", ")
            )
        } else {
            "User does not have the right permissions.".to_string()
        };
        Self {
            kind: RequirementKind::Permissions,
            required: permissions,
            message,
        }
    }

    /// Rejection for a subject holding none of `names` as module or permission.
    ///
    /// Names are shown only when both display toggles are on.
    pub fn for_modules_or_permissions(names: Vec<String>, config: &Config) -> Self {
        let message =
            if config.display_permission_in_exception && config.display_module_in_exception {
                format!(
                    "User does not have the right permissions. Necessary permissions are {}",
                    names.join(", ")
                )
            } else {
                "User does not have any of the necessary access rights.".to_string()
            };
        Self {
            kind: RequirementKind::ModulesOrPermissions,
            required: names,
            message,
        }
    }

    /// Rejection for a request without a subject.
    pub fn not_logged_in() -> Self {
        Self {
            kind: RequirementKind::Authentication,
            required: Vec::new(),
            message: "User is not logged in.".to_string(),
        }
    }

    /// What the request was missing.
    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    /// Names the subject would have needed.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Required module names, empty unless this is a module rejection.
    pub fn required_modules(&self) -> &[String] {
        match self.kind {
            RequirementKind::Modules => self.required.as_slice(),
            _ => &[],
        }
    }

    /// Required permission names, empty for module and login rejections.
    pub fn required_permissions(&self) -> &[String] {
        match self.kind {
            RequirementKind::Permissions | RequirementKind::ModulesOrPermissions => {
                self.required.as_slice()
            }
            _ => &[],
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        Self::STATUS
    }
}

/// Access requirement attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any of these modules.
    Modules(Vec<String>),
    /// Any of these permissions.
    Permissions(Vec<String>),
    /// Any of these names as a module or a permission.
    ModulesOrPermissions(Vec<String>),
}

impl Requirement {
    /// Parses a pipe list such as `"admin|editor"` into a module requirement.
    pub fn modules(names: &str) -> Self {
        Self::Modules(parse_pipe_list(names))
    }

    /// Parses a pipe list into a permission requirement.
    pub fn permissions(names: &str) -> Self {
        Self::Permissions(parse_pipe_list(names))
    }

    /// Parses a pipe list into a module-or-permission requirement.
    pub fn modules_or_permissions(names: &str) -> Self {
        Self::ModulesOrPermissions(parse_pipe_list(names))
    }

    /// Required names.
    pub fn names(&self) -> &[String] {
        match self {
            Self::Modules(names) | Self::Permissions(names) | Self::ModulesOrPermissions(names) => {
                names
            }
        }
    }

    fn reject(&self, config: &Config) -> Unauthorized {
        let names = self.names().to_vec();
        match self {
            Self::Modules(_) => Unauthorized::for_modules(names, config),
            Self::Permissions(_) => Unauthorized::for_permissions(names, config),
            Self::ModulesOrPermissions(_) => Unauthorized::for_modules_or_permissions(names, config),
        }
    }
}

/// Outcome of a failed [`Registrar::authorize_requirement`] call.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The subject lacks the requirement.
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),
    /// The check itself failed.
    #[error(transparent)]
    Internal(#[from] Error),
}

impl<S> Registrar<S>
where
    S: Store,
{
    /// Checks `requirement` for an optional subject.
    ///
    /// Unknown names and guard mismatches count as missing. Store and cache
    /// failures surface as [`AccessError::Internal`].
    pub async fn authorize_requirement(
        &self,
        subject: Option<&Subject>,
        requirement: &Requirement,
    ) -> std::result::Result<(), AccessError> {
        let Some(subject) = subject else {
            return Err(Unauthorized::not_logged_in().into());
        };

        let names = requirement.names();
        let granted = match requirement {
            Requirement::Modules(_) => subject.has_any_module(names),
            Requirement::Permissions(_) => self.can_any(subject, names).await?,
            Requirement::ModulesOrPermissions(_) => {
                subject.has_any_module(names) || self.can_any(subject, names).await?
            }
        };

        if granted {
            return Ok(());
        }
        tracing::debug!(
            subject = %subject.key(),
            required = ?names,
            "access requirement not met"
        );
        Err(requirement.reject(self.config()).into())
    }

    async fn can_any(&self, subject: &Subject, names: &[String]) -> crate::error::Result<bool> {
        for name in names {
            match self.can(subject, name.as_str()).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(Error::NotFound { .. } | Error::GuardMismatch { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn messages_should_hide_names_by_default() {
        let config = Config::default();

        let modules = Unauthorized::for_modules(names(&["admin"]), &config);
        let permissions = Unauthorized::for_permissions(names(&["edit"]), &config);
        let either = Unauthorized::for_modules_or_permissions(names(&["admin"]), &config);

        assert_eq!(modules.message(), "User does not have the right modules.");
        assert_eq!(permissions.message(), "User does not have the right permissions.");
        assert_eq!(
            either.message(),
            "User does not have any of the necessary access rights."
        );
        assert_eq!(modules.required_modules(), &["admin".to_string()]);
    }

    #[test]
    fn messages_should_list_names_when_enabled() {
        let config = Config::default()
            .display_module_in_exception(true)
            .display_permission_in_exception(true);

        let modules = Unauthorized::for_modules(names(&["admin", "editor"]), &config);
        let either = Unauthorized::for_modules_or_permissions(names(&["admin", "edit"]), &config);

        assert_eq!(
            modules.to_string(),
            "User does not have the right modules. Necessary modules are admin, editor"
        );
        assert_eq!(
            either.message(),
            "User does not have the right permissions. Necessary permissions are admin, edit"
        );
    }

    #[test]
    fn either_message_should_need_both_toggles() {
        let config = Config::default().display_permission_in_exception(true);
        let either = Unauthorized::for_modules_or_permissions(names(&["admin"]), &config);
        assert_eq!(
            either.message(),
            "User does not have any of the necessary access rights."
        );
    }

    #[test]
    fn not_logged_in_should_carry_no_names() {
        let rejection = Unauthorized::not_logged_in();
        assert_eq!(rejection.kind(), RequirementKind::Authentication);
        assert!(rejection.required().is_empty());
        assert_eq!(rejection.status(), 403);
        assert_eq!(rejection.message(), "User is not logged in.");
    }

    #[test]
    fn requirements_should_parse_pipe_lists() {
        assert_eq!(
            Requirement::modules("admin|editor"),
            Requirement::Modules(names(&["admin", "editor"]))
        );
        assert_eq!(
            Requirement::permissions("'a|b'").names(),
            &["a|b".to_string()]
        );
    }
}
