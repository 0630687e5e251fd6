use anyhow::anyhow;
use chrono::{DateTime, Utc};
use taskdesk_shared::TaskDto;
pub use taskdesk_shared::{TaskPriority as Priority, TaskStatus as Status};
use tracing::warn;

use crate::datetime::parse_timestamp;

/// Upper bound for hour fields accepted from the server.
const MAX_HOURS: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SiteRef {
    pub code: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: Option<Priority>,
    pub due: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub site: Option<SiteRef>,
}

impl Task {
    pub fn new_pending(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: Status::Pending,
            priority: None,
            due: None,
            estimated_hours: None,
            actual_hours: None,
            started_at: None,
            site: None,
        }
    }

    /// Hours already booked on the server, zero when never recorded.
    pub fn base_hours(&self) -> f64 {
        self.actual_hours.unwrap_or(0.0)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != Status::Completed && self.due.map(|due| due < now).unwrap_or(false)
    }

    #[tracing::instrument(skip(dto), fields(id = %dto.id))]
    pub fn from_dto(dto: TaskDto) -> anyhow::Result<Self> {
        let status = Status::from_wire(&dto.status)
            .ok_or_else(|| anyhow!("task {} has unknown status: {}", dto.id, dto.status))?;

        let priority = dto.priority.as_deref().and_then(|raw| {
            let parsed = Priority::from_wire(raw);
            if parsed.is_none() {
                warn!(id = %dto.id, priority = %raw, "ignoring unknown priority");
            }
            parsed
        });

        let due = pick_due_field(dto.due_date.as_deref(), dto.deadline.as_deref())
            .and_then(|raw| parse_optional_timestamp(&dto.id, "due", raw));

        let started_at = dto
            .started_at
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| parse_optional_timestamp(&dto.id, "startedAt", raw));

        let site = dto.site.and_then(|site| {
            let code = site.code.trim().to_string();
            if code.is_empty() && site.name.is_none() {
                None
            } else {
                Some(SiteRef {
                    code,
                    name: site.name,
                })
            }
        });

        let estimated_hours = checked_hours(&dto.id, "estimatedHours", dto.estimated_hours);
        let actual_hours = checked_hours(&dto.id, "actualHours", dto.actual_hours);

        Ok(Self {
            id: dto.id,
            title: dto.title,
            status,
            priority,
            due,
            estimated_hours,
            actual_hours,
            started_at,
            site,
        })
    }
}

/// Converts a fetched list, dropping (and logging) tasks that cannot be
/// understood instead of failing the whole load.
pub fn normalize(dtos: Vec<TaskDto>) -> Vec<Task> {
    dtos.into_iter()
        .filter_map(|dto| match Task::from_dto(dto) {
            Ok(task) => Some(task),
            Err(err) => {
                warn!(error = %err, "skipping malformed task");
                None
            }
        })
        .collect()
}

/// `dueDate` wins; `deadline` is only consulted when `dueDate` is absent
/// or blank.
fn pick_due_field<'a>(due_date: Option<&'a str>, deadline: Option<&'a str>) -> Option<&'a str> {
    due_date
        .filter(|raw| !raw.trim().is_empty())
        .or_else(|| deadline.filter(|raw| !raw.trim().is_empty()))
}

fn checked_hours(id: &str, field: &str, hours: Option<f64>) -> Option<f64> {
    let hours = hours?;
    if hours.is_finite() && (0.0..=MAX_HOURS).contains(&hours) {
        Some(hours)
    } else {
        warn!(id, field, hours, "ignoring out-of-range hours");
        None
    }
}

fn parse_optional_timestamp(id: &str, field: &str, raw: &str) -> Option<DateTime<Utc>> {
    match parse_timestamp(raw) {
        Ok(dt) => Some(dt),
        Err(err) => {
            warn!(id, field, raw, error = %err, "ignoring unparsable timestamp");
            None
        }
    }
}
