use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_datetime, format_duration_ms};
use crate::store::Store;
use crate::task::{Category, Task};
use crate::views::TaskStats;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color(),
            tz: cfg.timezone(),
        }
    }

    #[tracing::instrument(skip(self, tasks, store, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        store: &Store,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "#".to_string(),
            "".to_string(),
            "Due".to_string(),
            "Categories".to_string(),
            "Task".to_string(),
            "Tags".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let position = self.paint(&(idx + 1).to_string(), "33");
            let check = if task.completed {
                self.paint("x", "32")
            } else {
                String::new()
            };

            let due = task
                .due_date
                .map(|due| format_datetime(due, self.tz))
                .unwrap_or_default();
            let due = if task.is_overdue(now) {
                self.paint(&due, "31")
            } else {
                due
            };

            let categories = task
                .categories
                .iter()
                .filter_map(|id| store.category(*id))
                .map(|category| category.name.clone())
                .collect::<Vec<_>>()
                .join(", ");
            let tags = task
                .tags
                .iter()
                .map(|tag| format!("+{tag}"))
                .collect::<Vec<_>>()
                .join(" ");

            rows.push(vec![position, check, due, categories, task.text.clone(), tags]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, store))]
    pub fn print_task_info(&mut self, task: &Task, store: &Store) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.text)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(
            out,
            "status      {}",
            if task.completed { "completed" } else { "pending" }
        )?;
        if let Some(completed_at) = task.completed_at {
            writeln!(out, "completed   {}", format_datetime(completed_at, self.tz))?;
        }

        let categories = task
            .categories
            .iter()
            .map(|id| {
                store
                    .category(*id)
                    .map(|category| category.name.clone())
                    .unwrap_or_else(|| format!("({id})"))
            })
            .collect::<Vec<_>>()
            .join(", ");
        if !categories.is_empty() {
            writeln!(out, "categories  {categories}")?;
        }
        if !task.tags.is_empty() {
            writeln!(out, "tags        {}", task.tags.join(", "))?;
        }
        writeln!(out, "created     {}", format_datetime(task.created_at, self.tz))?;
        writeln!(out, "updated     {}", format_datetime(task.updated_at, self.tz))?;
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", format_datetime(due, self.tz))?;
        }

        if task.reminder.enabled {
            writeln!(
                out,
                "reminder    {} before, via {:?}",
                format_duration_ms(task.reminder.notify_before),
                task.reminder.notification_type
            )?;
            if let Some(sent_at) = task.reminder.sent_at {
                writeln!(out, "notified    {}", format_datetime(sent_at, self.tz))?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn print_category_table(&mut self, categories: &[&Category]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "#".to_string(),
            "Name".to_string(),
            "Color".to_string(),
            "Icon".to_string(),
        ];

        let mut rows = Vec::with_capacity(categories.len());
        for (idx, category) in categories.iter().enumerate() {
            rows.push(vec![
                self.paint(&(idx + 1).to_string(), "33"),
                category.name.clone(),
                category.color.clone(),
                category.icon.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, stats))]
    pub fn print_stats(&mut self, stats: TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "total      {}", stats.total)?;
        writeln!(out, "completed  {}", stats.completed)?;
        writeln!(out, "pending    {}", stats.pending)?;

        let overdue = stats.overdue.to_string();
        let overdue = if stats.overdue > 0 {
            self.paint(&overdue, "31")
        } else {
            overdue
        };
        writeln!(out, "overdue    {overdue}")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
