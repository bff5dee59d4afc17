// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point running the wmii event loop.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point running the wmii event loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn, LevelFilter};

use wmiirc::bindings;
use wmiirc::p9::Address;
use wmiirc::setup;
use wmiirc::statusbar::Statusbar;
use wmiirc::{Client, Dispatcher, Settings, Wm};

#[derive(Parser, Debug)]
#[command(author = "Lukas Bower", version, about = "wmii control loop", long_about = None)]
struct Cli {
    /// Manager address (`unix!/path` or `tcp!host!port`); defaults to $WMII_ADDRESS.
    #[arg(long)]
    address: Option<String>,

    /// TOML settings file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,

    /// Do not start the status bar.
    #[arg(long, default_value_t = false)]
    no_statusbar: bool,

    /// Skip $WMII_CONFPATH/autostart.sh.
    #[arg(long, default_value_t = false)]
    no_autostart: bool,
}

fn init_logging(level: LevelFilter) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str()));
    builder.format_timestamp_millis();
    if let Err(err) = builder.try_init() {
        eprintln!("logger already initialised: {err}");
    }
}

fn resolve_address(cli: &Cli) -> Result<Address> {
    match &cli.address {
        Some(address) => address
            .parse()
            .with_context(|| format!("invalid --address {address:?}")),
        None => Address::from_env().context("cannot locate wmii"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let settings = Settings::load_or_default(cli.config.as_deref())?;
    let address = resolve_address(&cli)?;
    let client = Client::dial(&address).with_context(|| format!("failed to connect to {address}"))?;
    info!("connected to {address} (msize {})", client.msize());

    setup::announce(&client).context("failed to announce start")?;

    let wm = Arc::new(Wm::new(Arc::new(client), settings));
    let table = bindings::default_table(&wm).context("invalid binding table")?;
    setup::configure(&wm, &table).context("failed to configure wmii")?;
    if let Err(err) = setup::init_lbar(&wm) {
        warn!("left bar setup incomplete: {err}");
    }

    let statusbar = (!cli.no_statusbar && wm.settings().statusbar.enable)
        .then(|| Statusbar::from_settings(wm.shared_client(), wm.settings()));
    if !cli.no_autostart {
        setup::autostart();
    }

    let events = Client::dial(&address).context("failed to open event connection")?;
    let dispatcher = Dispatcher::new(table);
    info!("reading events");
    let result = setup::forward_events(&events, &dispatcher);
    dispatcher.shutdown();
    if let Some(statusbar) = statusbar {
        statusbar.stop();
    }
    result.context("event stream failed")?;
    info!("event stream closed");
    Ok(())
}
