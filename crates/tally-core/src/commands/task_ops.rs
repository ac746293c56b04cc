use anyhow::bail;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::datetime::{parse_date_expr, parse_duration_expr};
use crate::engine::Engine;
use crate::task::{DEFAULT_NOTIFY_BEFORE_MS, NotificationType, ReminderPatch, TaskDraft, TaskPatch};

use super::{parse_mods, resolve_category_names, resolve_task_ref, task_position};

#[instrument(skip(engine, cfg, args, now))]
pub(super) fn cmd_add(
    engine: &mut Engine,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let mods = parse_mods(args, now, cfg.timezone())?;
    let text = mods.words.join(" ");
    if text.trim().is_empty() {
        bail!("a task needs a title");
    }

    let categories = resolve_category_names(engine.store(), &mods.category_names)?;

    let mut draft = TaskDraft::new(text);
    draft.description = mods.description.unwrap_or_default();
    draft.categories = categories;
    draft.due_date = mods.due.flatten();

    let id = engine.add_task(draft, now)?;
    if !mods.tags_add.is_empty() {
        engine.set_task_tags(id, mods.tags_add, now);
    }

    // The configured default lead time replaces the built-in one on fresh
    // tasks; the reminder itself stays off until armed.
    let default_notify_before = cfg.default_notify_before_ms();
    if default_notify_before != DEFAULT_NOTIFY_BEFORE_MS {
        engine.set_task_reminder(
            id,
            ReminderPatch {
                notify_before: Some(default_notify_before),
                ..Default::default()
            },
            now,
        );
    }

    println!("Created task {}.", task_position(engine.store(), id));
    Ok(())
}

#[instrument(skip(engine, cfg, args, now))]
pub(super) fn cmd_modify(
    engine: &mut Engine,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command modify");

    let Some((reference, rest)) = args.split_first() else {
        bail!("modify requires a task reference");
    };
    let id = resolve_task_ref(engine.store(), reference)?;
    let mods = parse_mods(rest, now, cfg.timezone())?;

    let mut patch = TaskPatch::default();
    let text = mods.words.join(" ");
    if !text.trim().is_empty() {
        patch.text = Some(text);
    }
    patch.description = mods.description;
    patch.due_date = mods.due;

    if mods.clear_categories {
        patch.categories = Some(vec![]);
    } else if !mods.category_names.is_empty() {
        let mut categories = engine
            .store()
            .task(id)
            .map(|task| task.categories.clone())
            .unwrap_or_default();
        for extra in resolve_category_names(engine.store(), &mods.category_names)? {
            if !categories.contains(&extra) {
                categories.push(extra);
            }
        }
        patch.categories = Some(categories);
    }

    if !mods.tags_add.is_empty() || !mods.tags_remove.is_empty() {
        patch.tags = Some(merged_tags(engine, id, &mods.tags_add, &mods.tags_remove));
    }

    engine.update_task(id, patch, now);
    println!("Modified task {}.", task_position(engine.store(), id));
    Ok(())
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_done(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command done");

    if args.is_empty() {
        bail!("done requires at least one task reference");
    }

    for reference in args {
        let id = resolve_task_ref(engine.store(), reference)?;
        engine.toggle_task(id, now);
        let position = task_position(engine.store(), id);
        match engine.store().task(id) {
            Some(task) if task.completed => println!("Completed task {position}."),
            Some(_) => println!("Reopened task {position}."),
            None => {}
        }
    }
    Ok(())
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_delete(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command delete");

    if args.is_empty() {
        bail!("delete requires at least one task reference");
    }

    // Resolve everything first so positions don't shift underfoot.
    let ids: Vec<Uuid> = args
        .iter()
        .map(|reference| resolve_task_ref(engine.store(), reference))
        .collect::<anyhow::Result<_>>()?;

    let mut deleted = 0;
    for id in ids {
        if engine.delete_task(id, now) {
            deleted += 1;
        }
    }
    println!("Deleted {deleted} task(s).");
    Ok(())
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_move(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command move");

    let [reference, position] = args else {
        bail!("usage: move <task> <position>");
    };
    let id = resolve_task_ref(engine.store(), reference)?;
    let position: usize = position.parse()?;
    if position == 0 {
        bail!("positions are 1-based");
    }

    // The store trusts this sequence verbatim, so it is computed here from
    // the current order.
    let mut order = engine.store().state().tasks.all_ids.clone();
    order.retain(|existing| *existing != id);
    let index = (position - 1).min(order.len());
    order.insert(index, id);

    engine.reorder_tasks(order, now);
    println!("Moved task to position {}.", task_position(engine.store(), id));
    Ok(())
}

#[instrument(skip(engine, cfg, args, now))]
pub(super) fn cmd_due(
    engine: &mut Engine,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command due");

    let [reference, expr] = args else {
        bail!("usage: due <task> <date-expression|none>");
    };
    let id = resolve_task_ref(engine.store(), reference)?;

    let due_date = if expr.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(parse_date_expr(expr, now, cfg.timezone())?)
    };

    engine.set_task_due_date(id, due_date, now);
    let position = task_position(engine.store(), id);
    match due_date {
        Some(_) => println!("Task {position} is now due {expr}."),
        None => println!("Cleared due date on task {position}."),
    }
    Ok(())
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_tag(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command tag");

    let Some((reference, rest)) = args.split_first() else {
        bail!("tag requires a task reference");
    };
    let id = resolve_task_ref(engine.store(), reference)?;

    let mut add = Vec::new();
    let mut remove = Vec::new();
    for token in rest {
        if let Some(tag) = token.strip_prefix('+') {
            add.push(tag.to_string());
        } else if let Some(tag) = token.strip_prefix('-') {
            remove.push(tag.to_string());
        } else {
            bail!("tags must be written as +name or -name, got: {token}");
        }
    }
    if add.is_empty() && remove.is_empty() {
        bail!("tag requires at least one +name or -name");
    }

    let tags = merged_tags(engine, id, &add, &remove);
    engine.set_task_tags(id, tags.clone(), now);
    println!(
        "Task {} tags: {}.",
        task_position(engine.store(), id),
        if tags.is_empty() {
            "(none)".to_string()
        } else {
            tags.join(", ")
        }
    );
    Ok(())
}

#[instrument(skip(engine, cfg, args, now))]
pub(super) fn cmd_remind(
    engine: &mut Engine,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command remind");

    let Some((reference, rest)) = args.split_first() else {
        bail!("remind requires a task reference");
    };
    let id = resolve_task_ref(engine.store(), reference)?;

    let mut patch = ReminderPatch::default();
    for token in rest {
        if token.eq_ignore_ascii_case("on") {
            patch.enabled = Some(true);
        } else if token.eq_ignore_ascii_case("off") {
            patch.enabled = Some(false);
        } else if let Some(span) = token.strip_prefix("before:") {
            patch.notify_before = Some(parse_duration_expr(span)?.num_milliseconds());
        } else if let Some(via) = token.strip_prefix("via:") {
            patch.notification_type = Some(match via.to_ascii_lowercase().as_str() {
                "toast" => NotificationType::Toast,
                "browser" | "desktop" => NotificationType::Browser,
                "both" => NotificationType::Both,
                other => bail!("unknown notification channel: {other}"),
            });
        } else {
            bail!("unknown remind option: {token}");
        }
    }

    if patch.enabled == Some(true)
        && engine
            .store()
            .task(id)
            .map(|task| task.due_date.is_none())
            .unwrap_or(false)
    {
        bail!("set a due date before arming a reminder (tally due <task> <when>)");
    }

    engine.set_task_reminder(id, patch, now);
    let position = task_position(engine.store(), id);
    match engine.store().task(id) {
        Some(task) if task.reminder.enabled => println!(
            "Reminder armed on task {position} ({} before due).",
            crate::datetime::format_duration_ms(task.reminder.notify_before)
        ),
        Some(_) => println!("Reminder disabled on task {position}."),
        None => {}
    }
    Ok(())
}

fn merged_tags(engine: &Engine, id: Uuid, add: &[String], remove: &[String]) -> Vec<String> {
    let mut tags = engine
        .store()
        .task(id)
        .map(|task| task.tags.clone())
        .unwrap_or_default();
    tags.retain(|tag| !remove.contains(tag));
    for tag in add {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}
