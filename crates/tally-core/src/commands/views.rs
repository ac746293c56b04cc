use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::engine::Engine;
use crate::filter::StatusFilter;
use crate::render::Renderer;
use crate::task::Task;

use super::{resolve_category_ref, resolve_task_ref};

#[instrument(skip(engine, renderer, args, now))]
pub(super) fn cmd_list(
    engine: &mut Engine,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    let mut status = StatusFilter::All;
    let mut category_refs = Vec::new();
    let mut query_words = Vec::new();

    for arg in args {
        if let Ok(parsed) = arg.parse::<StatusFilter>() {
            status = parsed;
        } else if let Some(name) = arg.strip_prefix("cat:") {
            category_refs.push(name.to_string());
        } else {
            query_words.push(arg.clone());
        }
    }

    let categories = category_refs
        .iter()
        .map(|name| resolve_category_ref(engine.store(), name))
        .collect::<anyhow::Result<Vec<Uuid>>>()?;

    engine.set_status_filter(status, now);
    engine.set_category_filter(categories, now);
    engine.set_search_query(query_words.join(" "), now);

    let ids: Vec<Uuid> = engine
        .visible_tasks()
        .iter()
        .map(|task| task.id)
        .collect();
    if ids.is_empty() {
        println!("No matching tasks.");
        return Ok(());
    }

    let store = engine.store();
    let tasks: Vec<&Task> = ids.iter().filter_map(|id| store.task(*id)).collect();
    renderer.print_task_table(&tasks, store, now)
}

#[instrument(skip(engine, renderer, args))]
pub(super) fn cmd_info(
    engine: &mut Engine,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command info");

    let Some(reference) = args.first() else {
        anyhow::bail!("info requires a task reference");
    };
    let id = resolve_task_ref(engine.store(), reference)?;
    let store = engine.store();
    let Some(task) = store.task(id) else {
        anyhow::bail!("no such task: {reference}");
    };
    renderer.print_task_info(task, store)
}

#[instrument(skip(engine, renderer, now))]
pub(super) fn cmd_stats(
    engine: &mut Engine,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command stats");
    renderer.print_stats(engine.stats(now))
}

#[instrument(skip(engine, renderer, now))]
pub(super) fn cmd_upcoming(
    engine: &mut Engine,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command upcoming");

    let ids: Vec<Uuid> = engine
        .upcoming_reminders(now)
        .iter()
        .map(|task| task.id)
        .collect();
    if ids.is_empty() {
        println!("No reminders in the next 24 hours.");
        return Ok(());
    }

    let store = engine.store();
    let tasks: Vec<&Task> = ids.iter().filter_map(|id| store.task(*id)).collect();
    renderer.print_task_table(&tasks, store, now)
}
