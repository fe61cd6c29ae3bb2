#![doc = include_str!("../README.md")]
use ::lib::config::Args;
use ::lib::{run, setup_tracing, Failure, KarafClient, Outcome};
use anyhow::{Context, Result};
use tracing::debug;

/// Merge settings, validate the request and hand it to its handler.
fn execute(args: &Args) -> Result<Outcome> {
    let settings = args.settings()?;
    setup_tracing(&settings)?;
    debug!("Merge settings and parameters : {:#?}", settings);

    // Reject invalid parameters before running anything
    let request = args.cmd.validate().context("Invalid parameters")?;
    let client = KarafClient::new(settings.client_bin.as_str());
    run(&client, &settings, &request)
}

#[paw::main]
fn main(args: Args) -> Result<()> {
    match execute(&args) {
        Ok(outcome) => {
            println!("{}", serde_json::to_string(&outcome)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string(&Failure::from(&e))?);
            Err(e)
        }
    }
}
