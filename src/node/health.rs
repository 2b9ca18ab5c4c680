//! Index health reporting and deadline-bounded readiness waits.

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Health of a single index, ordered so that `>=` means "at least as ready".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Index does not exist.
    Red,
    /// Index exists but has no materialized mapping yet.
    Yellow,
    /// Index is open and queryable.
    Green,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Red => "red",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Green => "green",
        }
    }
}

/// Polls `probe` until it reports at least `wait_for`, failing with
/// [`Error::ClusterUnavailable`] once `deadline` has elapsed. A wait can
/// never block forever.
pub fn wait_for_status<F>(
    index: &str,
    wait_for: HealthStatus,
    deadline: Duration,
    mut probe: F,
) -> Result<HealthStatus>
where
    F: FnMut() -> HealthStatus,
{
    let start = Instant::now();
    loop {
        let status = probe();
        if status >= wait_for {
            tracing::debug!(index, status = status.as_str(), "health wait satisfied");
            return Ok(status);
        }
        if start.elapsed() >= deadline {
            return Err(Error::ClusterUnavailable(format!(
                "index '{index}' did not reach {} within {deadline:?} (last seen: {})",
                wait_for.as_str(),
                status.as_str()
            )));
        }
        std::thread::sleep(Duration::from_millis(10).min(deadline));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_returns_immediately_when_satisfied() {
        let status =
            wait_for_status("idx", HealthStatus::Yellow, Duration::from_millis(50), || {
                HealthStatus::Green
            })
            .unwrap();
        assert_eq!(status, HealthStatus::Green);
    }

    #[test]
    fn test_wait_fails_with_cluster_unavailable_at_deadline() {
        let err = wait_for_status("idx", HealthStatus::Green, Duration::from_millis(30), || {
            HealthStatus::Red
        })
        .unwrap_err();
        assert!(matches!(err, Error::ClusterUnavailable(_)));
    }

    #[test]
    fn test_wait_observes_later_transitions() {
        let mut calls = 0;
        let status =
            wait_for_status("idx", HealthStatus::Green, Duration::from_secs(1), || {
                calls += 1;
                if calls >= 3 {
                    HealthStatus::Green
                } else {
                    HealthStatus::Yellow
                }
            })
            .unwrap();
        assert_eq!(status, HealthStatus::Green);
        assert!(calls >= 3);
    }
}
