//! The main process for communicating over IRC and feeding the router.

use std::sync::Arc;

use futures::stream::StreamExt;
use irc::client::prelude::Client;
use irc::client::Sender;
use irc::proto::{Command, Message as IrcMessage};
use tracing::{debug, warn};

use crate::config::Config;
use crate::message::{Actor, Location, Message, Replier};
use crate::plugin::Registry;
use crate::router::{Outcome, Router};
use crate::Error;

/// The main IRC bot struct that manages connection state and dispatch.
pub struct Bot {
    /// The complete configuration.
    config: Config,
    /// The IRC client - None until connection is established.
    client: Option<Client>,
    /// The loaded plugins.
    registry: Registry,
    /// The command router.
    router: Arc<Router>,
}

/// Replies through the IRC connection to a fixed target.
struct IrcReplier {
    sender: Sender,
    target: String,
}

impl Replier for IrcReplier {
    fn say(&self, text: &str) {
        if let Err(error) = self.sender.send_privmsg(&self.target, text) {
            warn!(target = %self.target, %error, "failed to send reply");
        }
    }
}

impl Bot {
    /// Creates a new bot from the provided configuration.
    ///
    /// This loads the plugin registry, which registers every plugin's
    /// command surface with the router, and grants the configured operator
    /// nicknames the `operator` policy class on the `chan` tree. The IRC
    /// connection is not established until [`Bot::run`].
    #[must_use]
    pub fn new(config: Config) -> Bot {
        let router = Arc::new(Router::new(config.router.max_inflight));
        let registry = Registry::preloaded(&router);

        router.set_class_rule("operator", "chan", true);

        Bot {
            config,
            client: None,
            registry,
            router,
        }
    }

    /// The router, for registering additional commands or policy.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The number of loaded plugins.
    #[must_use]
    pub fn num_plugins(&self) -> usize {
        self.registry.plugins.len()
    }

    /// Connects and continually polls for messages, dispatching each one.
    ///
    /// # Errors
    ///
    /// This function will return an error in the following situations:
    ///
    /// - [`Error::IrcClient`] - if the instantiation of the IRC client fails
    /// - [`Error::IrcRegistration`] - if user registration fails (e.g. if
    ///   the nickname is already taken)
    /// - [`Error::Irc`] - if a protocol or communication error occurred
    pub async fn run(&mut self) -> Result<(), Error> {
        let mut client = Client::from_config(self.config.irc.clone().into())
            .await
            .map_err(Error::IrcClient)?;

        client.identify().map_err(Error::IrcRegistration)?;

        let mut stream = client.stream()?;

        self.client = Some(client);

        if let Some(client) = &self.client {
            while let Some(message) = stream.next().await.transpose()? {
                self.handle_message(client, message).await;
            }
        }

        Ok(())
    }

    /// Converts one PRIVMSG into a router message and dispatches it. Lines
    /// without the command prefix and non-PRIVMSG traffic are ignored.
    async fn handle_message(&self, client: &Client, message: IrcMessage) {
        let Command::PRIVMSG(_, ref text) = message.command else {
            return;
        };

        let Some(text) = strip_command_prefix(text, &self.config.router.command_prefix) else {
            return;
        };

        let Some(nickname) = message.source_nickname().map(ToString::to_string) else {
            return;
        };
        let Some(target) = message.response_target().map(ToString::to_string) else {
            return;
        };

        let actor = self.actor_for(&nickname);
        let location = location_for(&target);
        let reply = Arc::new(IrcReplier {
            sender: client.sender(),
            target,
        });

        let inbound = Message::new(text, actor, location, reply.clone());

        match self.router.handle(inbound).await {
            Outcome::NoMatch => {
                debug!(text, "no command recognized");
            }
            Outcome::Denied { path } => {
                debug!(%nickname, %path, "denied");
                reply.say(&format!("{nickname}: you are not authorized ({path})"));
            }
            Outcome::Dispatched(_) => {}
        }
    }

    /// Builds the policy actor for a nickname, attaching the `operator`
    /// class when configured.
    fn actor_for(&self, nickname: &str) -> Actor {
        if self
            .config
            .auth
            .operators
            .iter()
            .any(|op| op.eq_ignore_ascii_case(nickname))
        {
            Actor::with_classes(nickname, &["operator"])
        } else {
            Actor::new(nickname)
        }
    }
}

/// Classifies a reply target: any RFC 2811 channel prefix means a channel,
/// everything else is a private query.
fn location_for(target: &str) -> Location {
    if target.starts_with(['#', '&', '+', '!']) {
        Location::Channel(target.to_string())
    } else {
        Location::Private
    }
}

/// Checks if the supplied input starts with the command prefix, and if so,
/// returns the command text after it.
#[must_use]
fn strip_command_prefix<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let suffix = input.strip_prefix(prefix)?;

    if suffix.trim().is_empty() {
        return None;
    }

    Some(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_stripped() {
        assert_eq!(strip_command_prefix("!echo hi", "!"), Some("echo hi"));
        assert_eq!(strip_command_prefix("echo hi", "!"), None);
        assert_eq!(strip_command_prefix("!", "!"), None);
        assert_eq!(strip_command_prefix("! ", "!"), None);
    }

    #[test]
    fn longer_prefixes_work() {
        assert_eq!(strip_command_prefix("hermod: cal", "hermod: "), Some("cal"));
        assert_eq!(strip_command_prefix("hermod:", "hermod: "), None);
    }

    #[test]
    fn every_channel_prefix_is_recognized() {
        for target in ["#rust", "&local", "+modeless", "!ABCDEchan"] {
            assert_eq!(
                location_for(target),
                Location::Channel(target.to_string())
            );
        }
        assert_eq!(location_for("alice"), Location::Private);
    }

    #[test]
    fn operators_get_the_operator_class() {
        let mut config = Config::default();
        config.auth.operators.push("mk".to_string());

        let bot = Bot::new(config);

        assert!(bot.actor_for("MK").classes.contains(&"operator".to_string()));
        assert!(bot.actor_for("alice").classes.is_empty());
    }
}
