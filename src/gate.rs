use crate::error::Result;
use crate::membership::Subject;
use crate::registrar::Registrar;
use crate::store::Store;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Answer of a single gate hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Grant and stop consulting later hooks.
    Allow,
    /// Refuse and stop consulting later hooks.
    Deny,
    /// Defer to the next hook.
    Abstain,
}

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

/// A hook consulted by [`Gate::check`] before any ability-specific policy.
#[async_trait]
pub trait GateHook: Send + Sync {
    /// Returns a verdict for `subject` performing `ability`.
    async fn before(&self, subject: &Subject, ability: &str) -> Result<Verdict>;
}

/// Adapts a synchronous closure into a [`GateHook`].
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> GateHook for FnHook<F>
where
    F: Fn(&Subject, &str) -> Result<Verdict> + Send + Sync,
{
    async fn before(&self, subject: &Subject, ability: &str) -> Result<Verdict> {
        (self.0)(subject, ability)
    }
}

/// Ordered chain of authorization hooks.
///
/// The first hook that does not abstain decides. When every hook abstains
/// the ability is denied.
#[derive(Default)]
pub struct Gate {
    hooks: Vec<Box<dyn GateHook>>,
}

impl Gate {
    /// Creates an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook.
    pub fn push(&mut self, hook: impl GateHook + 'static) -> &mut Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Appends a hook, builder style.
    pub fn with_hook(mut self, hook: impl GateHook + 'static) -> Self {
        self.push(hook);
        self
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true when no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs the hooks in registration order.
    pub async fn check(&self, subject: &Subject, ability: &str) -> Result<Decision> {
        for hook in &self.hooks {
            match hook.before(subject, ability).await? {
                Verdict::Allow => return Ok(Decision::Allow),
                Verdict::Deny => return Ok(Decision::Deny),
                Verdict::Abstain => {}
            }
        }
        tracing::debug!(subject = %subject.key(), ability, "all gate hooks abstained");
        Ok(Decision::Deny)
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Gate hook backed by a [`Registrar`].
///
/// Allows when the subject can perform the ability as a permission name and
/// abstains otherwise, including for abilities that are not permissions.
/// Other failures propagate.
pub struct PermissionHook<S> {
    registrar: Arc<Registrar<S>>,
}

impl<S> PermissionHook<S> {
    /// Wraps a shared registrar.
    pub fn new(registrar: Arc<Registrar<S>>) -> Self {
        Self { registrar }
    }
}

#[async_trait]
impl<S> GateHook for PermissionHook<S>
where
    S: Store + 'static,
{
    async fn before(&self, subject: &Subject, ability: &str) -> Result<Verdict> {
        match self.registrar.can(subject, ability).await {
            Ok(true) => Ok(Verdict::Allow),
            Ok(false) => Ok(Verdict::Abstain),
            Err(err) if err.is_not_found() => Ok(Verdict::Abstain),
            Err(err) => Err(err),
        }
    }
}
