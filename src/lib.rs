//! Pattern-routing IRC bot core.
//!
//! Inbound chat lines are tokenized, matched against the command templates
//! registered by plugins, gated by hierarchical authorization paths and
//! dispatched to handlers either inline or on a bounded worker pool.

pub mod auth;
pub mod bot;
pub mod config;
mod error;
pub mod invoke;
pub mod matcher;
pub mod message;
pub mod plugin;
pub mod router;
pub mod template;
pub mod tracing;

pub use bot::Bot;
pub use config::Config;
pub use error::Error;
pub use plugin::{Plugin, Registry};
pub use router::{Handler, MapOptions, Outcome, Router};
