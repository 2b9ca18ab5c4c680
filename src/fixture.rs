//! Per-test index lifecycle management.
//!
//! A fixture walks one index through
//! absent → creating → health-pending → ready → loading → refreshing →
//! queryable → tearing-down → absent. Setup-phase failures are fatal and
//! never retried. Teardown is idempotent and logs failures instead of
//! masking whatever the test itself reported.

use crate::node::{BulkOp, HealthStatus, LocalNode};
use crate::schema::IndexMapping;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_HEALTH_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    Absent,
    Creating,
    HealthPending,
    Ready,
    Loading,
    Refreshing,
    Queryable,
    TearingDown,
}

pub struct IndexFixture {
    node: Arc<LocalNode>,
    index: String,
    deadline: Duration,
    state: FixtureState,
    mapped: bool,
}

impl IndexFixture {
    pub fn new(node: Arc<LocalNode>, index: &str) -> Self {
        IndexFixture {
            node,
            index: index.to_string(),
            deadline: DEFAULT_HEALTH_DEADLINE,
            state: FixtureState::Absent,
            mapped: false,
        }
    }

    /// Bounds every health wait; exceeding it fails with
    /// [`Error::ClusterUnavailable`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn state(&self) -> FixtureState {
        self.state
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn node(&self) -> &Arc<LocalNode> {
        &self.node
    }

    /// Creates the index, first deleting any leftover of the same name from
    /// an earlier run. A mapping of `None` leaves the index pending for
    /// dynamic mapping on first load.
    pub fn create(&mut self, mapping: Option<IndexMapping>) -> Result<()> {
        self.expect_state(&[FixtureState::Absent], "create")?;
        self.state = FixtureState::Creating;
        self.node.delete_index(&self.index)?;
        self.mapped = mapping.is_some();
        self.node.create_index(&self.index, mapping)?;
        self.state = FixtureState::HealthPending;
        Ok(())
    }

    /// Waits for the index to reach its expected health: green once mapped,
    /// yellow while dynamic mapping is still pending.
    pub fn await_health(&mut self) -> Result<()> {
        self.expect_state(&[FixtureState::HealthPending], "await_health")?;
        let wait_for = if self.mapped {
            HealthStatus::Green
        } else {
            HealthStatus::Yellow
        };
        self.node
            .wait_for_health(&self.index, wait_for, self.deadline)?;
        self.state = FixtureState::Ready;
        Ok(())
    }

    /// Loads a batch. Any per-document failure aborts the fixture; there is
    /// no partial success to continue from.
    pub fn load(&mut self, ops: &[BulkOp]) -> Result<()> {
        self.expect_state(
            &[FixtureState::Ready, FixtureState::Queryable],
            "load",
        )?;
        self.state = FixtureState::Loading;
        self.node.bulk(&self.index, ops)?;
        self.mapped = true;
        self.state = FixtureState::Ready;
        Ok(())
    }

    /// Makes everything loaded so far visible to searches.
    pub fn refresh(&mut self) -> Result<()> {
        self.expect_state(
            &[FixtureState::Ready, FixtureState::Queryable],
            "refresh",
        )?;
        self.state = FixtureState::Refreshing;
        self.node.refresh(&self.index)?;
        self.state = FixtureState::Queryable;
        Ok(())
    }

    /// Create, wait, load and refresh in one step: the common path of a
    /// test that just needs a queryable corpus.
    pub fn provision(&mut self, mapping: Option<IndexMapping>, ops: &[BulkOp]) -> Result<()> {
        self.create(mapping)?;
        self.await_health()?;
        self.load(ops)?;
        self.refresh()
    }

    /// Deletes the index. Idempotent, and failures are logged rather than
    /// returned so a teardown can never mask the test outcome.
    pub fn tear_down(&mut self) {
        if self.state == FixtureState::Absent {
            return;
        }
        self.state = FixtureState::TearingDown;
        if let Err(e) = self.node.delete_index(&self.index) {
            tracing::warn!(index = %self.index, error = %e, "teardown failed");
        }
        self.state = FixtureState::Absent;
    }

    fn expect_state(&self, allowed: &[FixtureState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::Setup(format!(
                "cannot {operation} from state {:?}",
                self.state
            )))
        }
    }
}

impl Drop for IndexFixture {
    fn drop(&mut self) {
        self.tear_down();
    }
}
