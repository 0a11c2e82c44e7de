//! Channel operator commands, gated behind the `chan` authorization tree.
//!
//! The actual mode changes are the connection layer's concern; handlers
//! here acknowledge through the reply target so policy decisions stay
//! observable.

use crate::message::Location;
use crate::plugin::prelude::*;

pub struct Moderation;

struct OpHandler;

#[async_trait]
impl Handler for OpHandler {
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        let user = args
            .get("user")
            .unwrap_or(message.actor.nickname.as_str());
        let channel = target_channel(message, args);

        message.say(&format!("+o {user} on {channel}"));

        Ok(())
    }
}

struct OpMeHandler;

#[async_trait]
impl Handler for OpMeHandler {
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        let channel = target_channel(message, args);

        message.say(&format!("+o {} on {channel}", message.actor.nickname));

        Ok(())
    }
}

struct KickHandler;

#[async_trait]
impl Handler for KickHandler {
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        // `user` is mandatory and `reason` is greedy, so both are bound.
        let user = args.get("user").unwrap_or_default();
        let reason = args.joined("reason").unwrap_or_default();

        message.say(&format!("kicked {user} ({reason})"));

        Ok(())
    }
}

/// The explicit channel argument when given, otherwise the channel the
/// message came from.
fn target_channel(message: &Message, args: &Bindings) -> String {
    if let Some(channel) = args.get("channel") {
        return channel.to_string();
    }

    match &message.location {
        Location::Channel(name) => name.clone(),
        Location::Private => "(no channel)".to_string(),
    }
}

impl Plugin for Moderation {
    fn new() -> Moderation {
        Moderation {}
    }

    fn name() -> Name {
        Name("moderation")
    }

    fn author() -> Author {
        Author("Hermod contributors")
    }

    fn version() -> Version {
        Version("0.1")
    }

    fn register(&self, router: &Router) -> Result<(), Error> {
        // Mutating commands: closed unless policy opens them.
        router.default_auth("chan", false);

        router.map(
            "moderation",
            "op [:user] [:channel]",
            MapOptions::new().auth("chan::op"),
            Arc::new(OpHandler),
        )?;
        router.map(
            "moderation",
            "opme [:channel]",
            MapOptions::new().auth("chan::op"),
            Arc::new(OpMeHandler),
        )?;
        router.map(
            "moderation",
            "kick :user *reason",
            MapOptions::new().auth("chan::kick"),
            Arc::new(KickHandler),
        )?;

        Ok(())
    }
}
