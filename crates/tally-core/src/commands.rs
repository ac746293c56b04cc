mod category_ops;
mod task_ops;
mod views;
mod watch;

use anyhow::{anyhow, bail};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::parse_date_expr;
use crate::engine::Engine;
use crate::render::Renderer;
use crate::store::Store;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "info",
        "modify",
        "done",
        "delete",
        "move",
        "due",
        "tag",
        "remind",
        "cat-add",
        "cat-list",
        "cat-modify",
        "cat-delete",
        "cat-move",
        "stats",
        "upcoming",
        "watch",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(engine, cfg, renderer, inv))]
pub fn dispatch(
    engine: &mut Engine,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(command = %inv.command, args = ?inv.args, "dispatching command");

    match inv.command.as_str() {
        "add" => task_ops::cmd_add(engine, cfg, &inv.args, now),
        "list" => views::cmd_list(engine, renderer, &inv.args, now),
        "info" => views::cmd_info(engine, renderer, &inv.args),
        "modify" => task_ops::cmd_modify(engine, cfg, &inv.args, now),
        "done" => task_ops::cmd_done(engine, &inv.args, now),
        "delete" => task_ops::cmd_delete(engine, &inv.args, now),
        "move" => task_ops::cmd_move(engine, &inv.args, now),
        "due" => task_ops::cmd_due(engine, cfg, &inv.args, now),
        "tag" => task_ops::cmd_tag(engine, &inv.args, now),
        "remind" => task_ops::cmd_remind(engine, cfg, &inv.args, now),
        "cat-add" => category_ops::cmd_cat_add(engine, &inv.args, now),
        "cat-list" => category_ops::cmd_cat_list(engine, renderer),
        "cat-modify" => category_ops::cmd_cat_modify(engine, &inv.args, now),
        "cat-delete" => category_ops::cmd_cat_delete(engine, &inv.args, now),
        "cat-move" => category_ops::cmd_cat_move(engine, &inv.args, now),
        "stats" => views::cmd_stats(engine, renderer, now),
        "upcoming" => views::cmd_upcoming(engine, renderer, now),
        "watch" => watch::cmd_watch(engine, &inv.args),
        "help" => {
            cmd_help();
            Ok(())
        }
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn cmd_help() {
    println!("usage: tally [options] <command> [args]");
    println!();
    println!("  add <title> [due:EXPR] [cat:NAME] [+tag] [desc:TEXT]");
    println!("  list [all|pending|completed] [cat:NAME] [QUERY...]");
    println!("  info <task>");
    println!("  modify <task> [new title...] [due:EXPR] [cat:NAME] [+tag] [-tag]");
    println!("  done <task>...          toggle completion");
    println!("  delete <task>...");
    println!("  move <task> <position>");
    println!("  due <task> <EXPR|none>");
    println!("  tag <task> [+tag] [-tag]...");
    println!("  remind <task> [on|off] [before:SPAN] [via:toast|browser|both]");
    println!("  cat-add <name> [color:TOKEN] [icon:TOKEN]");
    println!("  cat-list | cat-modify | cat-delete | cat-move");
    println!("  stats | upcoming | watch [for:SPAN]");
    println!();
    println!("Tasks are addressed by list position or id prefix.");
}

/// Resolves a task reference: a 1-based display position, a full id, or a
/// unique id prefix.
fn resolve_task_ref(store: &Store, token: &str) -> anyhow::Result<Uuid> {
    let order = &store.state().tasks.all_ids;

    if let Ok(position) = token.parse::<usize>() {
        if position == 0 || position > order.len() {
            bail!("no task at position {position}");
        }
        return Ok(order[position - 1]);
    }

    if let Ok(id) = token.parse::<Uuid>() {
        if store.task(id).is_some() {
            return Ok(id);
        }
        bail!("no such task: {token}");
    }

    let lower = token.to_ascii_lowercase();
    let mut matches = order
        .iter()
        .copied()
        .filter(|id| id.to_string().starts_with(&lower));
    let Some(first) = matches.next() else {
        bail!("no such task: {token}");
    };
    if matches.next().is_some() {
        bail!("ambiguous task reference: {token}");
    }
    Ok(first)
}

/// Resolves a category by 1-based position, exact name (case-insensitive),
/// or id prefix.
fn resolve_category_ref(store: &Store, token: &str) -> anyhow::Result<Uuid> {
    let order = &store.state().categories.all_ids;

    if let Ok(position) = token.parse::<usize>() {
        if position == 0 || position > order.len() {
            bail!("no category at position {position}");
        }
        return Ok(order[position - 1]);
    }

    let lower = token.to_ascii_lowercase();
    if let Some(category) = store
        .state()
        .categories
        .iter_ordered()
        .find(|category| category.name.to_ascii_lowercase() == lower)
    {
        return Ok(category.id);
    }

    let mut matches = order
        .iter()
        .copied()
        .filter(|id| id.to_string().starts_with(&lower));
    let Some(first) = matches.next() else {
        bail!("no such category: {token}");
    };
    if matches.next().is_some() {
        bail!("ambiguous category reference: {token}");
    }
    Ok(first)
}

/// Display position of a task, 1-based, for confirmation messages.
fn task_position(store: &Store, id: Uuid) -> usize {
    store
        .state()
        .tasks
        .all_ids
        .iter()
        .position(|existing| *existing == id)
        .map(|idx| idx + 1)
        .unwrap_or(0)
}

/// Taskwarrior-style modifier tokens mixed into a command's arguments.
#[derive(Debug, Default)]
struct Mods {
    /// `due:EXPR` sets, `due:none` clears.
    due: Option<Option<DateTime<Utc>>>,
    description: Option<String>,
    category_names: Vec<String>,
    clear_categories: bool,
    tags_add: Vec<String>,
    tags_remove: Vec<String>,
    /// Plain words left over after modifier extraction.
    words: Vec<String>,
}

fn parse_mods(args: &[String], now: DateTime<Utc>, tz: Tz) -> anyhow::Result<Mods> {
    let mut mods = Mods::default();

    for arg in args {
        if let Some(expr) = arg.strip_prefix("due:") {
            if expr.is_empty() || expr.eq_ignore_ascii_case("none") {
                mods.due = Some(None);
            } else {
                mods.due = Some(Some(parse_date_expr(expr, now, tz)?));
            }
        } else if let Some(text) = arg.strip_prefix("desc:") {
            mods.description = Some(text.to_string());
        } else if let Some(name) = arg.strip_prefix("cat:") {
            if name.eq_ignore_ascii_case("none") {
                mods.clear_categories = true;
            } else if !name.is_empty() {
                mods.category_names.push(name.to_string());
            }
        } else if let Some(tag) = arg.strip_prefix('+') {
            if !tag.is_empty() {
                mods.tags_add.push(tag.to_string());
            }
        } else if let Some(tag) = arg.strip_prefix('-') {
            if !tag.is_empty() {
                mods.tags_remove.push(tag.to_string());
            }
        } else {
            mods.words.push(arg.clone());
        }
    }

    Ok(mods)
}

fn resolve_category_names(store: &Store, names: &[String]) -> anyhow::Result<Vec<Uuid>> {
    names
        .iter()
        .map(|name| resolve_category_ref(store, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{expand_command_abbrev, known_command_names, parse_mods, resolve_task_ref};
    use crate::store::Store;
    use crate::task::TaskDraft;

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("del", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("watch", &known), Some("watch"));
        // delete / done / due share the prefix.
        assert_eq!(expand_command_abbrev("d", &known), None);
        assert_eq!(expand_command_abbrev("zz", &known), None);
    }

    #[test]
    fn task_refs_resolve_by_position_and_prefix() {
        let mut store = Store::new();
        let now = Utc::now();
        let first = store.add_task(TaskDraft::new("first"), now).expect("add");
        let second = store.add_task(TaskDraft::new("second"), now).expect("add");

        assert_eq!(resolve_task_ref(&store, "1").expect("position"), first);
        assert_eq!(resolve_task_ref(&store, "2").expect("position"), second);
        assert!(resolve_task_ref(&store, "3").is_err());

        let prefix = &second.to_string()[..8];
        assert_eq!(resolve_task_ref(&store, prefix).expect("prefix"), second);
    }

    #[test]
    fn modifier_tokens_split_from_words() {
        let now = Utc::now();
        let args: Vec<String> = ["buy", "milk", "due:2h", "+shopping", "-stale", "cat:errands"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let mods = parse_mods(&args, now, chrono_tz::UTC).expect("parse");
        assert_eq!(mods.words, vec!["buy".to_string(), "milk".to_string()]);
        assert!(mods.due.expect("due set").is_some());
        assert_eq!(mods.tags_add, vec!["shopping".to_string()]);
        assert_eq!(mods.tags_remove, vec!["stale".to_string()]);
        assert_eq!(mods.category_names, vec!["errands".to_string()]);

        let cleared = parse_mods(&["due:none".to_string()], now, chrono_tz::UTC).expect("parse");
        assert_eq!(cleared.due, Some(None));
    }
}
