//! Time-related utilities.
//!
//! [`PhaseTimer`] records how long each phase of a pipeline run took, for a
//! one-line summary in the logs.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Records durations between labelled points.
///
/// Each call to [`PhaseTimer::point`] stores the time elapsed since the
/// previous point (or since construction) under the given label.
///
/// # Example
///
/// ```
/// use tilepress::time::PhaseTimer;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut timer = PhaseTimer::new();
/// timer.point("load");
/// timer.point("generate");
/// assert_eq!(timer.phases().len(), 2);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PhaseTimer {
    last: Instant,
    phases: Vec<(String, Duration)>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            phases: Vec::new(),
        }
    }

    /// Records the time since the last point under `label`.
    pub fn point(&mut self, label: impl Into<String>) {
        let now = Instant::now();
        self.phases.push((label.into(), now - self.last));
        self.last = now;
    }

    pub fn phases(&self) -> &[(String, Duration)] {
        &self.phases
    }

    /// Sum of the durations recorded under `label`.
    pub fn total(&self, label: &str) -> Duration {
        self.phases
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, d)| *d)
            .sum()
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhaseTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (label, duration)) in self.phases.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={:?}", label, duration)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_points_measure_elapsed_time() {
        let mut timer = PhaseTimer::new();
        tokio::time::advance(Duration::from_millis(30)).await;
        timer.point("load");
        tokio::time::advance(Duration::from_millis(70)).await;
        timer.point("generate");
        tokio::time::advance(Duration::from_millis(5)).await;
        timer.point("generate");

        assert_eq!(timer.total("load"), Duration::from_millis(30));
        assert_eq!(timer.total("generate"), Duration::from_millis(75));
        assert_eq!(timer.to_string(), "load=30ms generate=70ms generate=5ms");
    }
}
