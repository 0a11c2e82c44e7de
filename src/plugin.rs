//! Plugin surface: command modules that register their patterns with the
//! router at load time.

use tracing::debug;

use crate::router::Router;
use crate::Error;

/// The name of a plugin.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Name(pub &'static str);
/// The author of a plugin.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author(pub &'static str);
/// The version of a plugin.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Version(pub &'static str);

/// Render a month grid
#[cfg(feature = "plugin-calendar")]
pub mod calendar;
/// Repeat the arguments back
#[cfg(feature = "plugin-echo")]
pub mod echo;
/// Channel operator commands
#[cfg(feature = "plugin-moderation")]
pub mod moderation;
/// Delayed reminders
#[cfg(feature = "plugin-remind")]
pub mod remind;

/// Common includes used in plugins.
#[allow(unused)]
mod prelude {
    pub use std::sync::Arc;

    pub use super::{Author, Name, Plugin, Version};
    pub use crate::invoke::CancelToken;
    pub use crate::message::Message;
    pub use crate::router::{Handler, MapOptions, Router};
    pub use crate::template::Bindings;
    pub use crate::Error;
    pub use async_trait::async_trait;
}

/// The base trait that all plugins must implement.
pub trait Plugin: Send + Sync {
    /// Returns the name of the plugin.
    fn name() -> Name
    where
        Self: Sized;

    /// Returns the author of the plugin.
    fn author() -> Author
    where
        Self: Sized;

    /// Returns the version of the plugin.
    fn version() -> Version
    where
        Self: Sized;

    /// The constructor for a new plugin.
    fn new() -> Self
    where
        Self: Sized;

    /// Declares the plugin's command surface and baseline policy.
    ///
    /// # Errors
    ///
    /// Returns an error when one of the plugin's patterns does not compile;
    /// the registry logs it and keeps loading other plugins.
    fn register(&self, router: &Router) -> Result<(), Error>;
}

/// Plugin registry.
#[derive(Default)]
pub struct Registry {
    /// List of loaded plugins.
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl Registry {
    /// Constructs and returns a new, empty plugin registry.
    #[must_use]
    pub fn new() -> Registry {
        Registry { plugins: vec![] }
    }

    /// Constructs a registry with all enabled plugins registered against
    /// `router`.
    #[must_use]
    pub fn preloaded(router: &Router) -> Registry {
        let mut registry = Self::new();
        debug!("registering plugins");

        #[cfg(feature = "plugin-calendar")]
        registry.register::<calendar::Calendar>(router);
        #[cfg(feature = "plugin-echo")]
        registry.register::<echo::Echo>(router);
        #[cfg(feature = "plugin-moderation")]
        registry.register::<moderation::Moderation>(router);
        #[cfg(feature = "plugin-remind")]
        registry.register::<remind::Remind>(router);

        let num_plugins = registry.plugins.len();
        debug!(%num_plugins, "finished registering plugins");

        registry
    }

    /// Registers a new plugin based on its type. A plugin whose
    /// registration fails is skipped; other plugins still load.
    pub fn register<P: Plugin + 'static>(&mut self, router: &Router) -> bool {
        let plugin = Box::new(P::new());

        if let Err(error) = plugin.register(router) {
            tracing::warn!(plugin = P::name().0, %error, "plugin failed to register");
            return false;
        }

        self.plugins.push(plugin);

        true
    }
}
