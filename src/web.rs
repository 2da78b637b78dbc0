#![cfg(not(tarpaulin_include))]

use dexcel::app;
use dexcel::config::Config;
use std::env;

/// Main entry point for the web application
///
/// Reads the configuration from the environment; a first command line
/// argument overrides the listen address.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = Config::from_env();
    if let Some(addr) = env::args().nth(1) {
        config.addr = addr;
    }

    app::run(config).await
}
