//! Execution contexts carrying a lifetime (cancellation plus optional deadline) and a bag of
//! request-scoped values (the tracing span and typed extensions such as the request id or the
//! localizer).
//!
//! A context is cheap to clone. The two halves are independent: [`Context::detach`] builds a
//! context whose lifetime comes from one parent and whose values come from another, which is how
//! background work keeps the request's log correlation without dying with the request.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use http::Extensions;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, Span, instrument::Instrumented};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Clone)]
struct Lifetime {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Lifetime {
    fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }
}

#[derive(Clone)]
struct Values {
    span: Span,
    extensions: Extensions,
}

#[derive(Clone)]
pub struct Context {
    lifetime: Lifetime,
    values: Arc<Values>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.lifetime.token.is_cancelled())
            .field("deadline", &self.lifetime.deadline)
            .field("span", &self.values.span)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A root context: never done unless cancelled explicitly, no values, disabled span.
    pub fn background() -> Self {
        Self {
            lifetime: Lifetime::root(),
            values: Arc::new(Values {
                span: Span::none(),
                extensions: Extensions::new(),
            }),
        }
    }

    /// Combines the lifetime of `lifetime` with the values of `values`.
    ///
    /// Cancelling `values` (or anything it derives from) never affects the result. Cancelling the
    /// result, or `lifetime`, makes the result done.
    pub fn detach(lifetime: &Context, values: &Context) -> Self {
        Self {
            lifetime: lifetime.lifetime.child(),
            values: Arc::clone(&values.values),
        }
    }

    /// A child sharing this context's values; cancelling the parent cancels the child.
    pub fn child(&self) -> Self {
        Self {
            lifetime: self.lifetime.child(),
            values: Arc::clone(&self.values),
        }
    }

    /// A child that also becomes done once `timeout` elapses.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut child = self.child();
        let deadline = Instant::now() + timeout;
        child.lifetime.deadline = Some(match child.lifetime.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        child
    }

    pub fn with_span(&self, span: Span) -> Self {
        let mut values = (*self.values).clone();
        values.span = span;
        Self {
            lifetime: self.lifetime.clone(),
            values: Arc::new(values),
        }
    }

    /// Returns a context with `value` stored under its type, replacing any previous value of the
    /// same type. The lifetime is shared with `self`.
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut values = (*self.values).clone();
        values.extensions.insert(value);
        Self {
            lifetime: self.lifetime.clone(),
            values: Arc::new(values),
        }
    }

    pub fn value<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.extensions.get::<T>()
    }

    pub fn span(&self) -> &Span {
        &self.values.span
    }

    /// Runs `fut` inside this context's span.
    pub fn instrument<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.values.span.clone())
    }

    pub fn cancel(&self) {
        self.lifetime.token.cancel();
    }

    /// Cancels this context when the guard is dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.lifetime.token.clone().drop_guard()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.lifetime.deadline
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.lifetime.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.lifetime.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.lifetime.deadline {
            Some(deadline) => tokio::select! {
                _ = self.lifetime.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.lifetime.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}
