use argh::FromArgs;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use miette::{IntoDiagnostic, WrapErr};
use tracing::info;

use hermod::{Bot, Config};

/// Pattern-routing IRC bot.
#[derive(Debug, FromArgs)]
struct Opts {
    /// path to config file
    #[argh(option, short = 'c', default = "String::from(\"hermod.toml\")")]
    config: String,
}

/// Loads the configuration file, letting `HERMOD_`-prefixed environment
/// variables override individual values.
fn load_config(path: &str) -> miette::Result<Config> {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("HERMOD_").split("_"))
        .extract()
        .into_diagnostic()
        .wrap_err_with(|| format!("loading configuration from {path} failed"))
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let opts: Opts = argh::from_env();

    let config = load_config(&opts.config)?;

    hermod::tracing::try_init(&config.tracing)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.irc.hostname,
        "starting hermod"
    );

    let mut bot = Bot::new(config);

    info!(num_plugins = bot.num_plugins(), "plugins loaded");

    bot.run().await.into_diagnostic()?;

    Ok(())
}
