//! devopsbot core building blocks.
//!
//! This crate holds what the HTTP application composes: the execution [`Context`] used to hand
//! request-scoped values to background work, the [`AdminCache`] membership check, and the Slack
//! Web API surface behind the [`slack::SlackClient`] trait.
pub mod context;
pub mod membership;
pub mod slack;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use context::{Context, ContextError};
pub use membership::AdminCache;
