//! Bot configuration loaded from TOML and the environment.

use serde::{Deserialize, Serialize};

/// The complete bot configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// IRC client configuration.
    pub irc: IrcConfig,
    /// Command routing configuration.
    #[serde(default)]
    pub router: RouterConfig,
    /// Authorization configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Tracing configuration.
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Settings for the command router.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouterConfig {
    /// The prefix a line must carry to be treated as a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Maximum number of threaded handlers running at once.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for RouterConfig {
    fn default() -> RouterConfig {
        RouterConfig {
            command_prefix: default_command_prefix(),
            max_inflight: default_max_inflight(),
        }
    }
}

/// Settings for the authorization tables.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Nicknames placed in the `operator` policy class.
    #[serde(default)]
    pub operators: Vec<String>,
}

/// Settings for log output.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TracingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IrcTlsConfig {
    /// Enable TLS.
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IrcConfig {
    /// The client's nickname.
    pub nickname: String,
    /// Alternative nicknames for the client, if the default is taken.
    #[serde(default)]
    pub alt_nicks: Vec<String>,
    /// The client's username.
    pub username: Option<String>,
    /// The client's real name.
    pub realname: Option<String>,
    /// The hostname of the server to connect to.
    pub hostname: String,
    /// The password to connect to the server.
    pub password: Option<String>,
    /// The port number of the server to connect to.
    pub port: Option<u16>,
    /// TLS configuration.
    pub tls: Option<IrcTlsConfig>,
    /// Channels to join after registration.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl IrcConfig {
    #[must_use]
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None => self.fallback_port(),
        }
    }

    /// Return the port number to use based on whether the connection requires TLS or not.
    fn fallback_port(&self) -> u16 {
        if self.tls.as_ref().map(|tls| tls.enabled) == Some(true) {
            6697
        } else {
            6667
        }
    }
}

impl From<IrcConfig> for irc::client::data::Config {
    fn from(config: IrcConfig) -> Self {
        let port = config.port();
        let use_tls = config.tls.map(|x| x.enabled);

        irc::client::data::Config {
            nickname: Some(config.nickname),
            server: Some(config.hostname),
            port: Some(port),
            use_tls,
            channels: config.channels,
            alt_nicks: config.alt_nicks,
            username: config.username,
            realname: config.realname,
            password: config.password,
            ..Default::default()
        }
    }
}

#[must_use]
fn default_command_prefix() -> String {
    "!".to_string()
}

#[must_use]
const fn default_max_inflight() -> usize {
    8
}
