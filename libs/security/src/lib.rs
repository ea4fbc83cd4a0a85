//! Inbound webhook authentication for devopsbot.
//!
//! [`signature`] implements Slack's `v0` HMAC scheme; [`middleware`] wraps it as an axum layer
//! that buffers the body once and hands an equivalent body to the next handler.
pub mod middleware;
pub mod signature;

pub use middleware::verify_slack_request;
pub use signature::{SignatureError, SignedHeaders, SlackVerifier};
