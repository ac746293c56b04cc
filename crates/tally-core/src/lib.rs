pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod engine;
pub mod error;
pub mod filter;
pub mod notify;
pub mod persist;
pub mod remind;
pub mod render;
pub mod search;
pub mod store;
pub mod task;
pub mod timer;
pub mod views;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting tally CLI");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let storage = persist::FileStorage::open(&data_dir)
        .with_context(|| format!("failed to open storage at {}", data_dir.display()))?;
    let gateway = persist::Gateway::new(Box::new(storage), cfg.debounce_ms());

    let mut engine = engine::Engine::start(
        gateway,
        cfg.poll_interval_ms(),
        Box::new(notify::ConsoleToasts),
        Box::new(notify::ConsoleDesktop::new()),
    );
    let mut renderer = render::Renderer::new(&cfg);
    let inv = cli::Invocation::parse(cli.rest)?;

    let result = commands::dispatch(&mut engine, &cfg, &mut renderer, inv);

    // Teardown always runs so a trailing debounced save is not lost and no
    // timers leak past the process.
    engine.shutdown(Utc::now());

    result?;
    info!("done");
    Ok(())
}
