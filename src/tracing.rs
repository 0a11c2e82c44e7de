//! Log subscriber setup.

use miette::{IntoDiagnostic, WrapErr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config;

/// Initializes the global subscriber with an env-filter and either the
/// human-readable or the JSON formatter, per configuration.
///
/// # Errors
///
/// Fails when a subscriber has already been installed.
pub fn try_init(tracing: &config::TracingConfig) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if tracing.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .into_diagnostic()
        .wrap_err("installing the tracing subscriber failed")?;

    Ok(())
}
