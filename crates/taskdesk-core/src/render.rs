use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_display_date, round_hours};
use crate::summary::Summary;
use crate::task::{Priority, Status, Task};
use crate::tracker::{ElapsedTracker, format_hms};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    terminal: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        let terminal = io::stdout().is_terminal();

        Ok(Self::with_color(color && terminal).on_terminal(terminal))
    }

    /// A renderer writing to something that is not a terminal.
    pub fn with_color(color: bool) -> Self {
        Self {
            color,
            terminal: false,
        }
    }

    pub fn on_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Whether frames can be redrawn in place.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    #[tracing::instrument(skip_all)]
    pub fn print_task_table<F>(
        &self,
        tasks: &[&Task],
        tracker: &ElapsedTracker,
        is_updating: F,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let out = io::stdout().lock();
        self.write_task_table(out, tasks, tracker, is_updating, now)
    }

    pub fn write_task_table<W, F>(
        &self,
        out: W,
        tasks: &[&Task],
        tracker: &ElapsedTracker,
        is_updating: F,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>
    where
        W: Write,
        F: Fn(&str) -> bool,
    {
        let headers = ["ID", "Title", "Site", "Priority", "Due", "Status", "Time"]
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.id, "33");

            let site = task
                .site
                .as_ref()
                .map(|site| site.code.clone())
                .unwrap_or_default();

            let priority = match task.priority {
                Some(Priority::High) => self.paint("high", "31"),
                Some(Priority::Medium) => "medium".to_string(),
                Some(Priority::Low) => "low".to_string(),
                None => String::new(),
            };

            let due = task.due.map(format_display_date).unwrap_or_default();
            let due = if task.is_overdue(now) {
                self.paint(&due, "31")
            } else {
                due
            };

            let status = if is_updating(&task.id) {
                self.paint("updating…", "2")
            } else {
                match task.status {
                    Status::Pending => "pending".to_string(),
                    Status::InProgress => self.paint("in progress", "33"),
                    Status::Completed => self.paint("completed", "32"),
                }
            };

            rows.push(vec![
                id,
                task.title.clone(),
                site,
                priority,
                due,
                status,
                time_cell(task, tracker, now),
            ]);
        }

        write_table(out, headers, rows)
    }

    pub fn write_summary<W: Write>(&self, mut out: W, summary: &Summary) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} total  {} in progress  {} completed  {} pending",
            self.paint(&summary.total.to_string(), "1"),
            self.paint(&summary.in_progress.to_string(), "33"),
            self.paint(&summary.completed.to_string(), "32"),
            summary.pending,
        )?;
        Ok(())
    }

    pub fn print_summary(&self, summary: &Summary) -> anyhow::Result<()> {
        self.write_summary(io::stdout().lock(), summary)
    }

    pub fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// The `Time` column. A running task with a timer entry shows its live
/// clock; everything else, including a running task whose entry has not
/// been seeded, shows the static `actual / estimated` hours.
pub fn time_cell(task: &Task, tracker: &ElapsedTracker, now: DateTime<Utc>) -> String {
    if task.status == Status::InProgress
        && let Some(live) = tracker.live_duration(&task.id, task.base_hours(), now)
    {
        return format_hms(live);
    }

    let estimated = task
        .estimated_hours
        .map(format_hours)
        .unwrap_or_else(|| "-".to_string());
    format!("{} / {estimated}", format_hours(task.base_hours()))
}

fn format_hours(hours: f64) -> String {
    format!("{}h", round_hours(hours))
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

    let render_row = |writer: &mut W, cells: &[String]| -> io::Result<()> {
        let mut line = String::new();
        for (idx, cell) in cells.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        writeln!(writer, "{}", line.trim_end())
    };

    render_row(&mut writer, headers.as_slice())?;

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{rule}")?;

    for row in &rows {
        render_row(&mut writer, row.as_slice())?;
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
