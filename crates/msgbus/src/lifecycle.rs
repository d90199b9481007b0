//! # Lifecycle Contract
//!
//! The hosting service container drives every component through four calls:
//! `configure`, `start`, `stop` and a health probe. The container itself is
//! outside this crate; [`Msgbus`](crate::Msgbus) implements the contract.
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! #[async_trait]
//! impl Lifecycle for MyComponent {
//!     type Error = MyError;
//!     async fn configure(&self, _ctx: &LifecycleContext) -> Result<(), MyError> { Ok(()) }
//!     async fn start(&self, _ctx: &LifecycleContext) -> Result<(), MyError> { Ok(()) }
//!     async fn stop(&self, _ctx: &LifecycleContext) -> Result<(), MyError> { Ok(()) }
//!     async fn is_healthy(&self, _ctx: &LifecycleContext) -> bool { true }
//! }
//! ```

use async_trait::async_trait;
use tracing::Span;

/// Context handed in by the host on every lifecycle call.
///
/// Carries the host's logging span; components only attach their own
/// events to it.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    span: Span,
}

impl LifecycleContext {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Context with no parent span.
    pub fn detached() -> Self {
        Self { span: Span::none() }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for LifecycleContext {
    fn default() -> Self {
        Self::detached()
    }
}

/// Component lifecycle driven by the hosting container.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply resolved configuration.
    async fn configure(&self, ctx: &LifecycleContext) -> Result<(), Self::Error>;

    /// Acquire resources and begin serving.
    async fn start(&self, ctx: &LifecycleContext) -> Result<(), Self::Error>;

    /// Release resources.
    async fn stop(&self, ctx: &LifecycleContext) -> Result<(), Self::Error>;

    /// Health probe.
    async fn is_healthy(&self, ctx: &LifecycleContext) -> bool;
}
