//! Elapsed-time logging for long-running steps.

use std::time::{Duration, Instant};

use tracing::Level;

const WARN_AFTER: Duration = Duration::from_millis(100);
const ERROR_AFTER: Duration = Duration::from_millis(500);

/// Logs `"<label> ..."` when created and `"<label> done in <elapsed>"` when
/// stopped or dropped, escalating the level for slow steps.
#[must_use = "the timer logs its elapsed time when dropped"]
pub struct Timer {
  label:   String,
  started: Instant,
  stopped: bool,
}

impl Timer {
  pub fn start(label: impl Into<String>) -> Self {
    let label = label.into();
    tracing::info!("{label} ...");
    Self { label, started: Instant::now(), stopped: false }
  }

  pub fn stop(mut self) -> Duration { self.finish() }

  fn finish(&mut self) -> Duration {
    self.stopped = true;
    let elapsed = self.started.elapsed();
    let label = &self.label;
    let level = level_for(elapsed);
    if level == Level::ERROR {
      tracing::error!("{label} done in {elapsed:?}");
    } else if level == Level::WARN {
      tracing::warn!("{label} done in {elapsed:?}");
    } else {
      tracing::info!("{label} done in {elapsed:?}");
    }
    elapsed
  }
}

impl Drop for Timer {
  fn drop(&mut self) {
    if !self.stopped {
      self.finish();
    }
  }
}

fn level_for(elapsed: Duration) -> Level {
  if elapsed > ERROR_AFTER {
    Level::ERROR
  } else if elapsed > WARN_AFTER {
    Level::WARN
  } else {
    Level::INFO
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slow_steps_escalate() {
    assert_eq!(level_for(Duration::from_millis(5)), Level::INFO);
    assert_eq!(level_for(Duration::from_millis(101)), Level::WARN);
    assert_eq!(level_for(Duration::from_millis(501)), Level::ERROR);
  }
}
