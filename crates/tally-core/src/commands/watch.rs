use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::{info, instrument};

use crate::datetime::parse_duration_expr;
use crate::engine::Engine;

/// Long-running pump loop: fires reminder ticks and debounced flushes
/// until Ctrl-C (or the optional `for:SPAN` limit). Teardown happens in
/// `run`, which flushes and cancels the timers after the loop exits.
#[instrument(skip(engine, args))]
pub(super) fn cmd_watch(engine: &mut Engine, args: &[String]) -> anyhow::Result<()> {
    info!("command watch");

    let mut limit = None;
    for arg in args {
        if let Some(span) = arg.strip_prefix("for:") {
            limit = Some(parse_duration_expr(span)?);
        } else {
            bail!("unknown watch option: {arg}");
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let started = Utc::now();
    engine.ensure_scheduler(started);
    println!("Watching for reminders (Ctrl-C to stop).");

    while running.load(Ordering::SeqCst) {
        let now = Utc::now();
        engine.pump(now);

        if let Some(limit) = limit
            && now - started >= limit
        {
            info!("watch limit reached");
            break;
        }

        std::thread::sleep(std::time::Duration::from_millis(250));
    }

    Ok(())
}
