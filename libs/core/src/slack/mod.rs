//! Slack Web API surface: payload types, Block Kit builders, the [`SlackClient`] seam and its
//! `reqwest` implementation.
pub mod blocks;
pub mod client;
pub mod error;
pub mod types;
pub mod web;

pub use client::SlackClient;
pub use error::SlackError;
pub use types::*;
pub use web::SlackWebClient;
