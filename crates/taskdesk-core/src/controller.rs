use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use taskdesk_shared::TaskPatch;
use tracing::{debug, error, info, warn};

use crate::api::TaskApi;
use crate::datetime::format_iso_millis;
use crate::filter::SearchFilter;
use crate::summary::Summary;
use crate::task::{Status, Task, normalize};
use crate::tracker::ElapsedTracker;

/// Why an action was refused before any request was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotFound(String),
    WrongStatus {
        id: String,
        actual: Status,
        expected: Status,
    },
    InFlight(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::WrongStatus {
                id,
                actual,
                expected,
            } => write!(
                f,
                "task {id} is {} (expected {})",
                actual.as_wire(),
                expected.as_wire()
            ),
            Self::InFlight(id) => write!(f, "task {id} already has an update in flight"),
        }
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateKind {
    Start { at: DateTime<Utc> },
    Complete { hours: f64 },
}

/// An accepted action whose request has not been resolved yet. The task
/// stays in the in-flight set until the update is passed to
/// [`TaskListController::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub id: String,
    pub kind: UpdateKind,
    pub patch: TaskPatch,
}

pub struct TaskListController<A> {
    api: A,
    tasks: Vec<Task>,
    loading: bool,
    in_flight: BTreeSet<String>,
    search: SearchFilter,
    tracker: ElapsedTracker,
}

impl<A: TaskApi> TaskListController<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            tasks: vec![],
            loading: true,
            in_flight: BTreeSet::new(),
            search: SearchFilter::default(),
            tracker: ElapsedTracker::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_updating(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn tracker(&self) -> &ElapsedTracker {
        &self.tracker
    }

    pub fn search(&self) -> &SearchFilter {
        &self.search
    }

    pub fn set_search(&mut self, raw: impl Into<String>) {
        self.search = SearchFilter::new(raw);
        debug!(search = %self.search.as_str(), "search updated");
    }

    pub fn filtered(&self) -> Vec<&Task> {
        self.search.apply(&self.tasks)
    }

    pub fn summary(&self) -> Summary {
        Summary::from_tasks(&self.tasks)
    }

    /// Fetches the caller's tasks and seeds timers for work in progress.
    ///
    /// On failure the current list is kept (empty on first load) and the
    /// error is logged and returned. `loading` is cleared either way.
    #[tracing::instrument(skip(self, now))]
    pub async fn load(&mut self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        self.loading = true;
        let result = self.api.get_my_tasks().await;
        self.loading = false;

        match result {
            Ok(response) => {
                self.tasks = normalize(response.into_tasks());
                self.tracker.retain_in_progress(&self.tasks);
                let seeded = self.tracker.seed(&self.tasks, now);
                info!(
                    count = self.tasks.len(),
                    seeded_timers = seeded,
                    "loaded tasks"
                );
                Ok(self.tasks.len())
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to load tasks");
                Err(err.context("failed to load tasks"))
            }
        }
    }

    #[tracing::instrument(skip(self, now))]
    pub fn begin_start(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingUpdate, Rejection> {
        self.check(id, Status::Pending)?;

        let patch = TaskPatch {
            status: Some(Status::InProgress),
            started_at: Some(format_iso_millis(now)),
            ..TaskPatch::default()
        };
        Ok(self.register(id, UpdateKind::Start { at: now }, patch))
    }

    #[tracing::instrument(skip(self, now))]
    pub fn begin_complete(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<PendingUpdate, Rejection> {
        let base = self.check(id, Status::InProgress)?.base_hours();
        let hours = self.tracker.accumulated_hours(id, base, now);

        let patch = TaskPatch {
            status: Some(Status::Completed),
            actual_hours: Some(hours),
            ..TaskPatch::default()
        };
        Ok(self.register(id, UpdateKind::Complete { hours }, patch))
    }

    /// Resolves an update: the in-flight marker is always cleared, local
    /// state only changes when the request succeeded.
    #[tracing::instrument(skip(self, update, result), fields(id = %update.id))]
    pub fn finish(
        &mut self,
        update: PendingUpdate,
        result: anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        self.in_flight.remove(&update.id);

        if let Err(err) = result {
            error!(
                id = %update.id,
                kind = ?update.kind,
                error = %format!("{err:#}"),
                "task update failed"
            );
            return Err(err.context(format!("failed to update task {}", update.id)));
        }

        let Some(task) = self.tasks.iter_mut().find(|task| task.id == update.id) else {
            warn!(id = %update.id, "updated task is no longer in the list");
            return Ok(());
        };

        match update.kind {
            UpdateKind::Start { at } => {
                task.status = Status::InProgress;
                task.started_at = Some(at);
                self.tracker.start(&update.id, at);
                info!(id = %update.id, started_at = %at, "task started");
            }
            UpdateKind::Complete { hours } => {
                task.status = Status::Completed;
                task.actual_hours = Some(hours);
                self.tracker.remove(&update.id);
                info!(id = %update.id, actual_hours = hours, "task completed");
            }
        }
        Ok(())
    }

    pub async fn start(&mut self, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let update = self.begin_start(id, now)?;
        self.dispatch(update).await
    }

    pub async fn complete(&mut self, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let update = self.begin_complete(id, now)?;
        self.dispatch(update).await
    }

    async fn dispatch(&mut self, update: PendingUpdate) -> anyhow::Result<()> {
        let result = self.api.update_task(&update.id, &update.patch).await;
        self.finish(update, result)
    }

    fn check(&self, id: &str, expected: Status) -> Result<&Task, Rejection> {
        let task = self
            .task(id)
            .ok_or_else(|| Rejection::NotFound(id.to_string()))?;
        if self.in_flight.contains(id) {
            return Err(Rejection::InFlight(id.to_string()));
        }
        if task.status != expected {
            return Err(Rejection::WrongStatus {
                id: id.to_string(),
                actual: task.status,
                expected,
            });
        }
        Ok(task)
    }

    fn register(&mut self, id: &str, kind: UpdateKind, patch: TaskPatch) -> PendingUpdate {
        self.in_flight.insert(id.to_string());
        debug!(id, ?kind, "update in flight");
        PendingUpdate {
            id: id.to_string(),
            kind,
            patch,
        }
    }
}

impl<A> fmt::Debug for TaskListController<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskListController")
            .field("tasks", &self.tasks.len())
            .field("loading", &self.loading)
            .field("in_flight", &self.in_flight)
            .field("search", &self.search.as_str())
            .field("timers", &self.tracker.len())
            .finish()
    }
}
