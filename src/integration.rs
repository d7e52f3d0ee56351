//! One activated configuration entry
//!
//! Owns the API client, both coordinators, their poll timers and the webhook
//! handler, and forwards charging commands. Dropping the integration stops
//! the timers.

use crate::api::{ChargingAction, ClientSettings, EvlinkClient, Snapshot};
use crate::config::{Config, EntryConfig};
use crate::coordinator::{Coordinator, CoordinatorStatus, RefreshOutcome, SnapshotSource};
use crate::entities::{DeviceInfo, Entity, all_entities};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::notify::Notifier;
use crate::webhook::WebhookHandler;
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const USER_COORDINATOR: &str = "evlink_user";
pub const VEHICLE_COORDINATOR: &str = "evlink_vehicle";

/// Polls the user info endpoint
pub struct UserInfoSource {
    client: Arc<EvlinkClient>,
}

impl UserInfoSource {
    pub fn new(client: Arc<EvlinkClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for UserInfoSource {
    async fn fetch(&self) -> Result<Option<Snapshot>> {
        Ok(self.client.get_user_info().await)
    }
}

/// Polls the vehicle status endpoint
pub struct VehicleStatusSource {
    client: Arc<EvlinkClient>,
}

impl VehicleStatusSource {
    pub fn new(client: Arc<EvlinkClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for VehicleStatusSource {
    async fn fetch(&self) -> Result<Option<Snapshot>> {
        self.client.get_vehicle_status().await
    }
}

/// Results of a forced refresh of both coordinators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub user: RefreshOutcome,
    pub vehicle: RefreshOutcome,
}

pub struct Integration {
    entry: EntryConfig,
    client: Arc<EvlinkClient>,
    user: Arc<Coordinator>,
    vehicle: Arc<Coordinator>,
    webhook: WebhookHandler,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    logger: StructuredLogger,
}

impl Integration {
    /// Activate an entry: first refresh of both coordinators, then the poll
    /// timers and the webhook handler. Fails if either first refresh fails.
    pub async fn setup(
        config: &Config,
        entry: &EntryConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let settings = ClientSettings::for_entry(config, entry)?;
        let client = Arc::new(EvlinkClient::new(settings, notifier)?);
        let interval = Duration::from_secs(u64::from(entry.poll_interval_minutes) * 60);
        Self::with_sources(
            entry,
            client.clone(),
            Arc::new(UserInfoSource::new(client.clone())),
            Arc::new(VehicleStatusSource::new(client)),
            interval,
        )
        .await
    }

    /// Activate with explicit sources and interval
    pub async fn with_sources(
        entry: &EntryConfig,
        client: Arc<EvlinkClient>,
        user_source: Arc<dyn SnapshotSource>,
        vehicle_source: Arc<dyn SnapshotSource>,
        interval: Duration,
    ) -> Result<Self> {
        let logger = get_logger_with_context(
            LogContext::new("integration")
                .with_entry_id(&entry.entry_id)
                .with_vehicle_id(&entry.vehicle_id),
        );

        let user = Arc::new(Coordinator::new(USER_COORDINATOR, user_source, interval));
        let vehicle = Arc::new(Coordinator::new(VEHICLE_COORDINATOR, vehicle_source, interval));

        user.first_refresh().await?;
        vehicle.first_refresh().await?;

        let tasks = vec![user.spawn(), vehicle.spawn()];
        let webhook = WebhookHandler::new(&entry.webhook_id, vehicle.clone());
        logger.info(&format!(
            "Entry activated, polling every {} min",
            entry.poll_interval_minutes
        ));

        Ok(Self {
            entry: entry.clone(),
            client,
            user,
            vehicle,
            webhook,
            tasks: StdMutex::new(tasks),
            logger,
        })
    }

    pub fn entry(&self) -> &EntryConfig {
        &self.entry
    }

    pub fn user(&self) -> &Arc<Coordinator> {
        &self.user
    }

    pub fn vehicle(&self) -> &Arc<Coordinator> {
        &self.vehicle
    }

    pub fn webhook(&self) -> &WebhookHandler {
        &self.webhook
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::for_entry(&self.entry.entry_id)
    }

    /// Start or stop charging; `None` when the backend did not accept it
    pub async fn set_charging(&self, action: ChargingAction) -> Option<Value> {
        let result = self.client.set_charging(action).await;
        match &result {
            Some(_) => self.logger.info(&format!("Charging {} succeeded", action)),
            None => self.logger.error(&format!("Charging {} failed", action)),
        }
        result
    }

    /// Every entity projected from the current snapshots
    pub fn entities(&self) -> Vec<Entity> {
        let user = self.user.data();
        let vehicle = self.vehicle.data();
        all_entities(&self.entry.entry_id, user.as_deref(), vehicle.as_deref())
    }

    /// Force an update of both coordinators
    pub async fn refresh_all(&self) -> RefreshReport {
        let (user, vehicle) = tokio::join!(self.user.refresh(), self.vehicle.refresh());
        RefreshReport { user, vehicle }
    }

    pub fn statuses(&self) -> Vec<CoordinatorStatus> {
        vec![self.user.status(), self.vehicle.status()]
    }

    /// Stop both poll timers
    pub fn unload(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        for task in tasks.drain(..) {
            task.abort();
        }
        self.logger.info("Entry unloaded");
    }
}

impl Drop for Integration {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}
