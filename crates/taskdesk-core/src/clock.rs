//! The live view's one-second clock.
//!
//! The clock is a spawned interval task that feeds wall-clock instants
//! into a channel. It belongs to the view that created it: dropping the
//! [`LiveClock`] aborts the task, so no timer outlives its view.

use std::time::Duration;

use chrono::{
  DateTime,
  Utc
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{
  debug,
  trace
};

#[derive(Debug)]
pub struct LiveClock {
  ticks:  mpsc::Receiver<DateTime<Utc>>,
  handle: JoinHandle<()>
}

impl LiveClock {
  /// Must be called from within a tokio runtime.
  pub fn spawn(period: Duration) -> Self {
    let (tx, ticks) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
      let mut interval =
        tokio::time::interval(period);
      interval.set_missed_tick_behavior(
        MissedTickBehavior::Skip
      );
      loop {
        interval.tick().await;
        let now = Utc::now();
        trace!(now = %now, "clock tick");
        if tx.send(now).await.is_err() {
          break;
        }
      }
    });
    debug!(?period, "live clock started");

    Self { ticks, handle }
  }

  /// Next tick, or `None` once the clock task has ended.
  pub async fn tick(
    &mut self
  ) -> Option<DateTime<Utc>> {
    self.ticks.recv().await
  }

  pub fn is_running(&self) -> bool {
    !self.handle.is_finished()
  }

  /// Aborts the clock task and waits until it is gone.
  pub async fn stop(mut self) {
    self.handle.abort();
    if let Err(err) =
      (&mut self.handle).await
      && !err.is_cancelled()
    {
      tracing::warn!(error = %err, "live clock task failed");
    }
    debug!("live clock stopped");
  }
}

impl Drop for LiveClock {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
