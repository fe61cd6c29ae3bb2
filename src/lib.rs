#![warn(missing_docs)]
//! Karafctl main components and helper functions used by `main`
use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

pub mod client;
pub mod command;
pub mod config;
pub mod features;
pub mod outcome;
pub mod properties;
pub mod value;
pub use client::KarafClient;
pub use config::{Args, Request, Settings};
pub use outcome::{Failure, Outcome};

use features::ensure_feature;
use properties::{delete_properties, set_properties, ApplyOptions};

/// Setup logging to stderr, stdout being reserved to the result record.
/// (Tracing is a bit more involving to set up but will provide much more feature if needed)
pub fn setup_tracing(settings: &Settings) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_new(settings.verbose.get_level_filter())
        .context("Initializing log filter")?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
    Ok(())
}

/// Handle a validated [`Request`] against the karaf instance behind `client`.
pub fn run(client: &KarafClient, settings: &Settings, request: &Request) -> Result<Outcome> {
    debug!("Handling {:?} with {:?}", request, client);
    let outcome = match request {
        Request::SetProperties {
            pid,
            properties,
            check_mode,
        } => {
            let options = ApplyOptions {
                check_mode: *check_mode,
                strict: settings.strict,
            };
            Outcome::Config(set_properties(client, pid, properties, options)?)
        }
        Request::DeleteProperties {
            pid,
            names,
            check_mode,
        } => {
            let options = ApplyOptions {
                check_mode: *check_mode,
                strict: settings.strict,
            };
            Outcome::Config(delete_properties(client, pid, names, options)?)
        }
        Request::Feature(feature) => Outcome::Feature(ensure_feature(client, feature)?),
    };
    info!("changed: {}", outcome.changed());
    Ok(outcome)
}
