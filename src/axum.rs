//! Axum integration utilities.

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::access::{AccessError, Requirement, Unauthorized};
use crate::membership::Subject;
use crate::registrar::Registrar;

use ::axum::body::Body;
use ::axum::response::{IntoResponse, Response};
use ::http::{Request, StatusCode};
use ::tower::{Layer, Service};

/// Authenticated subject attached to a request by the host's auth layer.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Subject with its modules and direct permissions loaded.
    pub subject: Subject,
}

impl AuthContext {
    /// Wraps a loaded subject.
    pub fn new(subject: Subject) -> Self {
        Self { subject }
    }
}

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.message().to_string()).into_response()
    }
}

/// Middleware layer that rejects requests failing a [`Requirement`].
#[derive(Debug, Clone)]
pub struct RequireLayer<S> {
    registrar: Arc<Registrar<S>>,
    requirement: Requirement,
}

impl<S> RequireLayer<S> {
    /// Creates a layer checking `requirement`.
    pub fn new(registrar: Arc<Registrar<S>>, requirement: Requirement) -> Self {
        Self {
            registrar,
            requirement,
        }
    }

    /// Requires any of the modules in a pipe list.
    pub fn modules(registrar: Arc<Registrar<S>>, names: &str) -> Self {
        Self::new(registrar, Requirement::modules(names))
    }

    /// Requires any of the permissions in a pipe list.
    pub fn permissions(registrar: Arc<Registrar<S>>, names: &str) -> Self {
        Self::new(registrar, Requirement::permissions(names))
    }

    /// Requires any name in a pipe list as a module or a permission.
    pub fn modules_or_permissions(registrar: Arc<Registrar<S>>, names: &str) -> Self {
        Self::new(registrar, Requirement::modules_or_permissions(names))
    }
}

impl<S, Inner> Layer<Inner> for RequireLayer<S>
where
    S: crate::store::Store,
{
    type Service = RequireService<Inner, S>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RequireService {
            inner,
            registrar: self.registrar.clone(),
            requirement: self.requirement.clone(),
        }
    }
}

/// Middleware service that enforces a [`Requirement`].
#[derive(Debug, Clone)]
pub struct RequireService<Inner, S> {
    inner: Inner,
    registrar: Arc<Registrar<S>>,
    requirement: Requirement,
}

impl<Inner, S> Service<Request<Body>> for RequireService<Inner, S>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    S: crate::store::Store + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let registrar = self.registrar.clone();
        let requirement = self.requirement.clone();

        Box::pin(async move {
            let context = req.extensions().get::<AuthContext>().cloned();
            let subject = context.as_ref().map(|context| &context.subject);

            match registrar.authorize_requirement(subject, &requirement).await {
                Ok(()) => {
                    poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(req).await
                }
                Err(AccessError::Unauthorized(rejection)) => Ok(rejection.into_response()),
                Err(AccessError::Internal(err)) => {
                    tracing::error!(error = %err, "access check failed");
                    Ok((StatusCode::INTERNAL_SERVER_ERROR, "auth error").into_response())
                }
            }
        })
    }
}
