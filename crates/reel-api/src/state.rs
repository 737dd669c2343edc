//! Application state.

use std::sync::Arc;

use reel_firestore::FirestoreJobStatusStore;
use reel_render::CliRenderer;
use reel_storage::R2Client;
use reel_worker::{
    AdmissionController, JobOrchestrator, OperatorNotifier, StatusReporter, WebhookNotifier,
    WorkerConfig,
};
use tracing::{info, warn};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<JobOrchestrator>,
    pub admission: AdmissionController,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let worker_config = WorkerConfig::from_env()?;

        let storage = R2Client::from_env().await?;
        if let Err(e) = storage.check_connectivity().await {
            warn!("Artifact store is not reachable yet: {}", e);
        }
        let statuses = FirestoreJobStatusStore::from_env().await?;
        let renderer = CliRenderer::new(worker_config.renderer.clone());

        let notifier: Option<Arc<dyn OperatorNotifier>> = match &worker_config.operator_webhook_url {
            Some(url) => Some(Arc::new(WebhookNotifier::new(url.clone())?)),
            None => {
                info!("OPERATOR_WEBHOOK_URL not set, failure notifications disabled");
                None
            }
        };

        let admission = AdmissionController::new(worker_config.admission_capacity);
        let reporter = StatusReporter::new(Arc::new(statuses), notifier);
        let orchestrator = JobOrchestrator::new(
            worker_config,
            Arc::new(storage),
            Arc::new(renderer),
            reporter,
        );

        Ok(Self::from_parts(config, Arc::new(orchestrator), admission))
    }

    /// Assemble state from prebuilt collaborators.
    pub fn from_parts(
        config: ApiConfig,
        orchestrator: Arc<JobOrchestrator>,
        admission: AdmissionController,
    ) -> Self {
        Self {
            config,
            orchestrator,
            admission,
        }
    }
}
