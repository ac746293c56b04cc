use anyhow::bail;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::engine::Engine;
use crate::render::Renderer;
use crate::task::{Category, CategoryDraft, CategoryPatch};

use super::resolve_category_ref;

const DEFAULT_COLOR: &str = "gray";

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_cat_add(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command cat-add");

    let (name_words, color, icon) = split_cat_tokens(args);
    let name = name_words.join(" ");
    if name.trim().is_empty() {
        bail!("a category needs a name");
    }

    let draft = CategoryDraft {
        name,
        color: color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        icon: icon.unwrap_or_default(),
    };
    let id = engine.add_category(draft, now)?;

    let name = engine
        .store()
        .category(id)
        .map(|category| category.name.clone())
        .unwrap_or_default();
    println!("Created category '{name}'.");
    Ok(())
}

#[instrument(skip(engine, renderer))]
pub(super) fn cmd_cat_list(engine: &mut Engine, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command cat-list");

    let categories: Vec<&Category> = engine.categories().iter_ordered().collect();
    if categories.is_empty() {
        println!("No categories.");
        return Ok(());
    }
    renderer.print_category_table(&categories)
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_cat_modify(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command cat-modify");

    let Some((reference, rest)) = args.split_first() else {
        bail!("cat-modify requires a category reference");
    };
    let id = resolve_category_ref(engine.store(), reference)?;

    let (name_words, color, icon) = split_cat_tokens(rest);
    let name = name_words.join(" ");

    let patch = CategoryPatch {
        name: (!name.trim().is_empty()).then_some(name),
        color,
        icon,
    };
    engine.update_category(id, patch, now);

    let name = engine
        .store()
        .category(id)
        .map(|category| category.name.clone())
        .unwrap_or_default();
    println!("Modified category '{name}'.");
    Ok(())
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_cat_delete(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command cat-delete");

    if args.is_empty() {
        bail!("cat-delete requires a category reference");
    }

    for reference in args {
        let id = resolve_category_ref(engine.store(), reference)?;
        let name = engine
            .store()
            .category(id)
            .map(|category| category.name.clone())
            .unwrap_or_default();
        engine.delete_category(id, now);
        println!("Deleted category '{name}'. Tasks keep the assignment until edited.");
    }
    Ok(())
}

#[instrument(skip(engine, args, now))]
pub(super) fn cmd_cat_move(
    engine: &mut Engine,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command cat-move");

    let [reference, position] = args else {
        bail!("usage: cat-move <category> <position>");
    };
    let id = resolve_category_ref(engine.store(), reference)?;
    let position: usize = position.parse()?;
    if position == 0 {
        bail!("positions are 1-based");
    }

    let mut order = engine.store().state().categories.all_ids.clone();
    order.retain(|existing| *existing != id);
    let index = (position - 1).min(order.len());
    order.insert(index, id);

    engine.reorder_categories(order, now);
    println!("Moved category to position {position}.");
    Ok(())
}

fn split_cat_tokens(args: &[String]) -> (Vec<String>, Option<String>, Option<String>) {
    let mut words = Vec::new();
    let mut color = None;
    let mut icon = None;

    for arg in args {
        if let Some(value) = arg.strip_prefix("color:") {
            color = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("icon:") {
            icon = Some(value.to_string());
        } else {
            words.push(arg.clone());
        }
    }

    (words, color, icon)
}
