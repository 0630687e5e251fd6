//! Per-task timer entries for work in progress.
//!
//! An entry maps a task id to the instant its current session started.
//! Entries live only for the session: they are seeded from the fetched
//! list, created when a task is started and removed when it completes.

use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Duration,
  Utc
};
use tracing::{
  debug,
  warn
};

use crate::datetime::{
  duration_to_hours,
  hours_to_duration,
  round_hours
};
use crate::task::{
  Status,
  Task
};

#[derive(Debug, Clone, Default)]
pub struct ElapsedTracker {
  entries: BTreeMap<String, DateTime<Utc>>
}

impl ElapsedTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates entries for in-progress tasks that have none yet.
  ///
  /// A server-provided `started_at` is used verbatim. Without one the
  /// start is reconstructed as `now - actual_hours`, falling back to
  /// `now` when that instant cannot be represented.
  #[tracing::instrument(skip(self, tasks, now))]
  pub fn seed(
    &mut self,
    tasks: &[Task],
    now: DateTime<Utc>
  ) -> usize {
    let mut seeded = 0;
    for task in tasks {
      if task.status != Status::InProgress
        || self.entries.contains_key(&task.id)
      {
        continue;
      }

      let start = match task.started_at {
        | Some(started_at) => started_at,
        | None => hours_to_duration(
          task.base_hours()
        )
        .and_then(|booked| {
          now.checked_sub_signed(booked)
        })
        .unwrap_or_else(|| {
          warn!(
            id = %task.id,
            hours = task.base_hours(),
            "booked hours out of range; timing from now"
          );
          now
        })
      };
      debug!(
        id = %task.id,
        start = %start,
        exact = task.started_at.is_some(),
        "seeded timer entry"
      );
      self
        .entries
        .insert(task.id.clone(), start);
      seeded += 1;
    }
    seeded
  }

  /// Drops entries whose task is gone or no longer in progress.
  pub fn retain_in_progress(
    &mut self,
    tasks: &[Task]
  ) {
    self.entries.retain(|id, _| {
      tasks.iter().any(|task| {
        task.id == *id
          && task.status
            == Status::InProgress
      })
    });
  }

  pub fn start(
    &mut self,
    id: &str,
    at: DateTime<Utc>
  ) {
    self.entries.insert(id.to_string(), at);
  }

  pub fn remove(
    &mut self,
    id: &str
  ) -> Option<DateTime<Utc>> {
    self.entries.remove(id)
  }

  pub fn get(
    &self,
    id: &str
  ) -> Option<DateTime<Utc>> {
    self.entries.get(id).copied()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.entries.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Time since the entry's start, clamped at zero for starts in the
  /// future.
  pub fn elapsed(
    &self,
    id: &str,
    now: DateTime<Utc>
  ) -> Option<Duration> {
    self.get(id).map(|start| {
      (now - start).max(Duration::zero())
    })
  }

  pub fn live_duration(
    &self,
    id: &str,
    base_hours: f64,
    now: DateTime<Utc>
  ) -> Option<Duration> {
    self.elapsed(id, now).map(|elapsed| {
      hours_to_duration(base_hours)
        .and_then(|base| {
          elapsed.checked_add(&base)
        })
        .unwrap_or(elapsed)
    })
  }

  /// Total worked hours to persist on completion, rounded to two
  /// decimals. Without an entry only `base_hours` counts.
  pub fn accumulated_hours(
    &self,
    id: &str,
    base_hours: f64,
    now: DateTime<Utc>
  ) -> f64 {
    let session = self
      .elapsed(id, now)
      .map(duration_to_hours)
      .unwrap_or(0.0);
    round_hours(base_hours + session)
  }
}

/// `HH:MM:SS`, hours not wrapped at 24.
#[must_use]
pub fn format_hms(
  duration: Duration
) -> String {
  let total =
    duration.num_seconds().max(0);
  let hours = total / 3600;
  let minutes = (total % 3600) / 60;
  let seconds = total % 60;
  format!(
    "{hours:02}:{minutes:02}:{seconds:02}"
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    ElapsedTracker,
    format_hms
  };
  use crate::task::{
    Status,
    Task
  };

  fn in_progress(
    id: &str,
    actual: Option<f64>
  ) -> Task {
    let mut task =
      Task::new_pending(id, id);
    task.status = Status::InProgress;
    task.actual_hours = actual;
    task
  }

  fn now() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 10, 19, 9, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn seed_uses_server_start_when_present()
  {
    let now = now();
    let t0 = now - Duration::hours(3);
    let mut task =
      in_progress("a", Some(0.5));
    task.started_at = Some(t0);

    let mut tracker =
      ElapsedTracker::new();
    assert_eq!(
      tracker.seed(&[task], now),
      1
    );
    assert_eq!(tracker.get("a"), Some(t0));
  }

  #[test]
  fn seed_approximates_from_actual_hours()
  {
    let now = now();
    let mut tracker =
      ElapsedTracker::new();
    tracker.seed(
      &[in_progress("b", Some(0.5))],
      now
    );
    assert_eq!(
      tracker.get("b"),
      Some(
        now
          - Duration::milliseconds(
            1_800_000
          )
      )
    );
  }

  #[test]
  fn seed_skips_existing_and_non_running()
  {
    let now = now();
    let earlier =
      now - Duration::minutes(5);
    let mut tracker =
      ElapsedTracker::new();
    tracker.start("a", earlier);

    let seeded = tracker.seed(
      &[
        in_progress("a", Some(4.0)),
        Task::new_pending("p", "p")
      ],
      now
    );

    assert_eq!(seeded, 0);
    assert_eq!(tracker.len(), 1);
    assert_eq!(
      tracker.get("a"),
      Some(earlier)
    );
  }

  #[test]
  fn live_duration_adds_base_hours() {
    let now = now();
    let mut tracker =
      ElapsedTracker::new();
    tracker.start(
      "a",
      now - Duration::seconds(65)
    );

    let live = tracker
      .live_duration("a", 1.0, now)
      .expect("entry exists");
    assert_eq!(
      format_hms(live),
      "01:01:05"
    );
    assert_eq!(
      tracker.live_duration(
        "missing", 1.0, now
      ),
      None
    );
  }

  #[test]
  fn accumulated_hours_rounds_to_two_decimals()
   {
    let now = now();
    let mut tracker =
      ElapsedTracker::new();
    tracker.start(
      "a",
      now
        - Duration::milliseconds(
          1_800_000
        )
    );
    tracker.start(
      "b",
      now - Duration::seconds(100)
    );

    assert_eq!(
      tracker
        .accumulated_hours("a", 2.0, now),
      2.5
    );
    assert_eq!(
      tracker
        .accumulated_hours("b", 0.0, now),
      0.03
    );
    assert_eq!(
      tracker.accumulated_hours(
        "none", 1.234, now
      ),
      1.23
    );
  }

  #[test]
  fn out_of_range_hours_do_not_panic() {
    let now = now();
    let mut tracker =
      ElapsedTracker::new();
    let seeded = tracker.seed(
      &[
        in_progress("huge", Some(1e10)),
        in_progress("neg", Some(-1e20)),
        in_progress("nan", Some(f64::NAN))
      ],
      now
    );

    assert_eq!(seeded, 3);
    assert_eq!(tracker.get("huge"), Some(now));
    assert_eq!(tracker.get("neg"), Some(now));
    assert_eq!(
      tracker
        .live_duration("neg", -1e20, now),
      Some(Duration::zero())
    );
  }

  #[test]
  fn future_start_clamps_to_zero() {
    let now = now();
    let mut tracker =
      ElapsedTracker::new();
    tracker.start(
      "a",
      now + Duration::minutes(2)
    );
    assert_eq!(
      tracker.elapsed("a", now),
      Some(Duration::zero())
    );
  }

  #[test]
  fn retain_drops_finished_tasks() {
    let now = now();
    let mut tracker =
      ElapsedTracker::new();
    tracker.start("a", now);
    tracker.start("gone", now);

    let mut done =
      in_progress("a", None);
    done.status = Status::Completed;
    tracker.retain_in_progress(&[done]);
    assert!(tracker.is_empty());
  }

  #[test]
  fn hms_does_not_wrap_hours() {
    assert_eq!(
      format_hms(
        Duration::hours(125)
          + Duration::seconds(7)
      ),
      "125:00:07"
    );
    assert_eq!(
      format_hms(Duration::zero()),
      "00:00:00"
    );
  }
}
