//! Error types

use miette::Diagnostic;
use thiserror::Error;

use crate::template::PatternError;

/// Application errors for IRC, routing and handler operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failed to create the IRC client.
    #[error("Could not create IRC client")]
    IrcClient(#[source] irc::error::Error),
    /// Failed to register with the IRC server.
    #[error("Could not send registration details for IRC")]
    IrcRegistration(#[source] irc::error::Error),
    /// General IRC communication error.
    #[error("IRC error")]
    Irc(#[from] irc::error::Error),
    /// A command pattern failed to compile at registration time.
    #[error("Invalid command pattern")]
    Pattern(
        #[from]
        #[diagnostic_source]
        PatternError,
    ),
    /// An error raised inside a command handler body.
    #[error("Handler error: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}
