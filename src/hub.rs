//! Entry lifecycle
//!
//! The hub holds the configuration, the setup wizard and the active
//! integration. Activation runs the first refresh of both coordinators; when
//! it fails the hub keeps retrying in the background. Creating,
//! reconfiguring or changing options of the entry saves the configuration and
//! reloads the integration.

use crate::api::Snapshot;
use crate::config::{Config, EntryConfig};
use crate::error::{EvlinkError, Result};
use crate::integration::Integration;
use crate::logging::{StructuredLogger, get_logger};
use crate::notify::{NotificationCenter, Notifier};
use crate::setup::{
    self, ABORT_ALREADY_CONFIGURED, ABORT_NOT_CONFIGURED, AccountProbe, FlowResult,
    OptionsInput, ReconfigureInput, SetupFlow, UserInput, VehicleInput,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

pub struct Hub {
    config: RwLock<Config>,
    config_path: Option<PathBuf>,
    notifications: Arc<NotificationCenter>,
    probe: Arc<dyn AccountProbe>,
    flow: Mutex<SetupFlow>,
    active: RwLock<Option<Arc<Integration>>>,
    retry_task: StdMutex<Option<JoinHandle<()>>>,
    logger: StructuredLogger,
}

impl Hub {
    /// `config_path` receives the configuration whenever the entry changes;
    /// `None` keeps changes in memory only
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        notifications: Arc<NotificationCenter>,
        probe: Arc<dyn AccountProbe>,
    ) -> Self {
        let environments: Vec<String> = config.environments.keys().cloned().collect();
        Self {
            config: RwLock::new(config),
            config_path,
            notifications,
            probe,
            flow: Mutex::new(SetupFlow::new(environments)),
            active: RwLock::new(None),
            retry_task: StdMutex::new(None),
            logger: get_logger("hub"),
        }
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn environments(&self) -> Vec<String> {
        self.config.read().await.environments.keys().cloned().collect()
    }

    pub async fn is_configured(&self) -> bool {
        self.config.read().await.entry.is_some()
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    /// The active integration, if the entry has been activated
    pub async fn active(&self) -> Option<Arc<Integration>> {
        self.active.read().await.clone()
    }

    /// Activate the configured entry once, replacing any active integration
    pub async fn activate(&self) -> Result<()> {
        let config = self.config.read().await.clone();
        let Some(entry) = config.entry.clone() else {
            return Err(EvlinkError::setup("No entry configured"));
        };
        let notifier: Arc<dyn Notifier> = self.notifications.clone();
        let integration = Integration::setup(&config, &entry, notifier).await?;

        let previous = self.active.write().await.replace(Arc::new(integration));
        if let Some(previous) = previous {
            previous.unload();
        }
        Ok(())
    }

    /// Try to activate now; on failure keep retrying in the background every
    /// `activation_retry_secs`. Returns whether the entry is active.
    pub async fn start(self: &Arc<Self>) -> bool {
        self.cancel_retry();
        if !self.is_configured().await {
            self.logger.info("No entry configured; waiting for setup");
            return false;
        }
        match self.activate().await {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .warn(&format!("Activation failed, will retry: {}", e));
                self.schedule_retry().await;
                false
            }
        }
    }

    async fn schedule_retry(self: &Arc<Self>) {
        let delay = Duration::from_secs(self.config.read().await.activation_retry_secs.max(1));
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                match this.activate().await {
                    Ok(()) => {
                        this.logger.info("Entry activated after retry");
                        break;
                    }
                    Err(e) => this
                        .logger
                        .warn(&format!("Activation retry failed: {}", e)),
                }
            }
        });
        if let Ok(mut slot) = self.retry_task.lock()
            && let Some(old) = slot.replace(handle)
        {
            old.abort();
        }
    }

    fn cancel_retry(&self) {
        if let Ok(mut slot) = self.retry_task.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
    }

    /// Stop the active integration and any pending activation retry
    pub async fn unload(&self) {
        self.cancel_retry();
        if let Some(integration) = self.active.write().await.take() {
            integration.unload();
        }
    }

    /// Validate and store a new entry, persist the configuration, reload
    pub async fn apply_entry(self: &Arc<Self>, entry: EntryConfig) -> Result<()> {
        {
            let mut config = self.config.write().await;
            entry.validate(&config.environments)?;
            let mut updated = config.clone();
            updated.entry = Some(entry);
            if let Some(path) = &self.config_path {
                updated.save_to_file(path)?;
                self.logger
                    .info(&format!("Configuration saved to {}", path.display()));
            }
            *config = updated;
        }
        self.unload().await;
        self.start().await;
        Ok(())
    }

    pub async fn setup_user(self: &Arc<Self>, input: Option<UserInput>) -> FlowResult {
        if self.is_configured().await {
            return FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED.to_string(),
            };
        }
        let mut flow = self.flow.lock().await;
        flow.step_user(self.probe.as_ref(), input).await
    }

    pub async fn setup_vehicle(self: &Arc<Self>, input: Option<VehicleInput>) -> Result<FlowResult> {
        if self.is_configured().await {
            return Ok(FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED.to_string(),
            });
        }
        let mut flow = self.flow.lock().await;
        let result = flow.step_vehicle(input);
        if let FlowResult::CreateEntry { entry, .. } = &result {
            self.logger
                .info(&format!("Creating entry for vehicle {}", entry.vehicle_id));
            self.apply_entry(entry.clone()).await?;
        }
        Ok(result)
    }

    pub async fn setup_restart(&self) -> FlowResult {
        self.flow.lock().await.restart()
    }

    pub async fn reconfigure(
        self: &Arc<Self>,
        input: Option<ReconfigureInput>,
    ) -> Result<FlowResult> {
        let (existing, environments) = {
            let config = self.config.read().await;
            let Some(entry) = config.entry.clone() else {
                return Ok(FlowResult::Abort {
                    reason: ABORT_NOT_CONFIGURED.to_string(),
                });
            };
            (entry, config.environments.keys().cloned().collect::<Vec<_>>())
        };
        let result = setup::reconfigure(self.probe.as_ref(), &existing, &environments, input).await;
        if let FlowResult::UpdateEntry { entry } = &result {
            self.apply_entry(entry.clone()).await?;
        }
        Ok(result)
    }

    pub async fn options(self: &Arc<Self>, input: Option<OptionsInput>) -> Result<FlowResult> {
        let Some(existing) = self.config.read().await.entry.clone() else {
            return Ok(FlowResult::Abort {
                reason: ABORT_NOT_CONFIGURED.to_string(),
            });
        };
        let result = setup::options(&existing, input);
        if let FlowResult::UpdateEntry { entry } = &result {
            self.apply_entry(entry.clone()).await?;
        }
        Ok(result)
    }

    /// Route a push payload to the active integration. `None` when no active
    /// integration owns the webhook id.
    pub async fn handle_webhook(&self, webhook_id: &str, body: &[u8]) -> Option<Result<Snapshot>> {
        let integration = self.active().await?;
        if integration.webhook().webhook_id() != webhook_id {
            return None;
        }
        Some(integration.webhook().handle(body))
    }
}
