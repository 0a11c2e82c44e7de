//! Boundary types between the connection layer and the router.

use std::fmt;
use std::sync::Arc;

/// The class every actor implicitly belongs to.
pub const EVERYONE: &str = "everyone";

/// The originator of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// The actor's nickname.
    pub nickname: String,
    /// Policy classes the actor belongs to, most specific first. The
    /// implicit `everyone` class does not need to be listed.
    pub classes: Vec<String>,
}

impl Actor {
    /// Creates an actor with no classes beyond the implicit `everyone`.
    #[must_use]
    pub fn new(nickname: &str) -> Actor {
        Actor {
            nickname: nickname.to_string(),
            classes: Vec::new(),
        }
    }

    /// Creates an actor belonging to the given policy classes.
    #[must_use]
    pub fn with_classes(nickname: &str, classes: &[&str]) -> Actor {
        Actor {
            nickname: nickname.to_string(),
            classes: classes.iter().map(ToString::to_string).collect(),
        }
    }

    /// The actor's classes followed by the implicit `everyone` class.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(EVERYONE))
    }
}

/// Where a message originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A channel, e.g. `#hermod`.
    Channel(String),
    /// A private query.
    Private,
}

impl Location {
    /// A stable key for policy lookups; private queries share one key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Location::Channel(name) => name,
            Location::Private => "*private*",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Channel(name) => write!(f, "{name}"),
            Location::Private => write!(f, "(private)"),
        }
    }
}

/// Output callback back into the connection layer.
///
/// The router never interprets or transforms the text it passes through.
pub trait Replier: Send + Sync {
    /// Sends `text` to the message's reply target.
    fn say(&self, text: &str);
}

/// A replier that discards all output, for contexts without a reply target.
pub struct NullReplier;

impl Replier for NullReplier {
    fn say(&self, _text: &str) {}
}

/// One inbound chat line, as seen by the router.
#[derive(Clone)]
pub struct Message {
    /// The command text, with any bot prefix already stripped.
    pub text: String,
    /// Who sent it.
    pub actor: Actor,
    /// Where it was sent.
    pub location: Location,
    /// Callback used for replies.
    pub reply: Arc<dyn Replier>,
}

impl Message {
    /// Creates a message.
    #[must_use]
    pub fn new(text: &str, actor: Actor, location: Location, reply: Arc<dyn Replier>) -> Message {
        Message {
            text: text.to_string(),
            actor,
            location,
            reply,
        }
    }

    /// Sends `text` back to the reply target.
    pub fn say(&self, text: &str) {
        self.reply.say(text);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("text", &self.text)
            .field("actor", &self.actor)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
