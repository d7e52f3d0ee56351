//! Polling coordinator
//!
//! Wraps a snapshot source and a fixed interval. The last good snapshot is
//! held in a `watch` channel, so readers never block on an in-flight fetch
//! and every replacement is atomic and visible to all subscribers at once.

use crate::api::Snapshot;
use crate::error::{EvlinkError, Result};
use crate::logging::{LogContext, get_logger_with_context};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Shared, immutable view of a coordinator's snapshot
pub type SharedSnapshot = Option<Arc<Snapshot>>;

/// Zero-argument fetch wrapped by a coordinator.
///
/// `Ok(Some)` is fresh data, `Ok(None)` an absent result, `Err` with
/// [`EvlinkError::RateLimited`] a cycle to skip; any other `Err` is a failure.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Option<Snapshot>>;
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Fresh snapshot published
    Updated,
    /// Retryable failure; cached snapshot untouched
    Skipped,
    /// Absent result or error; cached snapshot retained
    Failed(String),
}

/// Bookkeeping exposed for diagnostics
#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CoordinatorStatus {
    pub name: String,
    pub interval_secs: u64,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub successful_updates: u64,
    pub skipped_updates: u64,
    pub failed_updates: u64,
    pub published_updates: u64,
}

pub struct Coordinator {
    name: String,
    interval: Duration,
    source: Arc<dyn SnapshotSource>,
    tx: watch::Sender<SharedSnapshot>,
    status: StdRwLock<CoordinatorStatus>,
    // Serializes fetches between the timer and forced refreshes
    refresh_lock: Mutex<()>,
    logger: crate::logging::StructuredLogger,
}

impl Coordinator {
    pub fn new(name: &str, source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        let status = CoordinatorStatus {
            name: name.to_string(),
            interval_secs: interval.as_secs(),
            ..CoordinatorStatus::default()
        };
        Self {
            name: name.to_string(),
            interval,
            source,
            tx,
            status: StdRwLock::new(status),
            refresh_lock: Mutex::new(()),
            logger: get_logger_with_context(
                LogContext::new("coordinator").with_field("name", name.to_string()),
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current snapshot; never waits for a fetch
    pub fn data(&self) -> SharedSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every replacement
    pub fn subscribe(&self) -> watch::Receiver<SharedSnapshot> {
        self.tx.subscribe()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Initial fetch before the coordinator counts as ready. Anything other
    /// than fresh data fails the activation.
    pub async fn first_refresh(&self) -> Result<()> {
        match self.refresh().await {
            RefreshOutcome::Updated => Ok(()),
            RefreshOutcome::Skipped => Err(EvlinkError::setup(format!(
                "{}: first refresh was rate limited",
                self.name
            ))),
            RefreshOutcome::Failed(reason) => Err(EvlinkError::setup(format!(
                "{}: first refresh failed: {}",
                self.name, reason
            ))),
        }
    }

    /// Run one fetch cycle now
    pub async fn refresh(&self) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;
        let outcome = match self.source.fetch().await {
            Ok(Some(snapshot)) => {
                self.tx.send_replace(Some(Arc::new(snapshot)));
                RefreshOutcome::Updated
            }
            Ok(None) => RefreshOutcome::Failed("no data returned".to_string()),
            Err(e) if e.is_retryable() => {
                self.logger
                    .debug(&format!("Skipping update cycle: {}", e));
                RefreshOutcome::Skipped
            }
            Err(e) => RefreshOutcome::Failed(e.to_string()),
        };

        if let RefreshOutcome::Failed(reason) = &outcome {
            self.logger.error(&format!(
                "Error fetching {} data: {}; keeping previous snapshot",
                self.name, reason
            ));
        }
        self.record(&outcome);
        outcome
    }

    /// Replace the snapshot immediately, outside the timer, and notify readers
    pub fn publish(&self, snapshot: Snapshot) {
        self.publish_with(move |_| snapshot);
    }

    /// Derive the next snapshot from the current one and publish it.
    ///
    /// Read, update and replace happen under the channel's write lock, so
    /// concurrent publishers and poll results are applied one after another
    /// and none is lost. An absent snapshot is passed as an empty object.
    pub fn publish_with<F>(&self, update: F) -> Snapshot
    where
        F: FnOnce(&Snapshot) -> Snapshot,
    {
        let mut next = Snapshot::new();
        self.tx.send_modify(|current| {
            next = match current.as_deref() {
                Some(old) => update(old),
                None => update(&Snapshot::new()),
            };
            *current = Some(Arc::new(next.clone()));
        });
        if let Ok(mut st) = self.status.write() {
            st.published_updates += 1;
            st.last_update_success = true;
            st.last_error = None;
            st.last_updated = Some(Utc::now());
        }
        self.logger.debug("Published snapshot outside the poll timer");
        next
    }

    fn record(&self, outcome: &RefreshOutcome) {
        let Ok(mut st) = self.status.write() else {
            return;
        };
        match outcome {
            RefreshOutcome::Updated => {
                st.successful_updates += 1;
                st.last_update_success = true;
                st.last_error = None;
                st.last_updated = Some(Utc::now());
            }
            RefreshOutcome::Skipped => {
                st.skipped_updates += 1;
            }
            RefreshOutcome::Failed(reason) => {
                st.failed_updates += 1;
                st.last_update_success = false;
                st.last_error = Some(reason.clone());
            }
        }
    }

    /// Start the poll timer. The first tick fires one interval from now,
    /// since activation has already performed the first refresh.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + this.interval, this.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            this.logger.info(&format!(
                "Polling every {}s",
                this.interval.as_secs_f64()
            ));
            loop {
                ticker.tick().await;
                let _ = this.refresh().await;
            }
        })
    }
}
