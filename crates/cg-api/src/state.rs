//! Application state.

use std::sync::Arc;

use cg_media::{
    load_default_detector, FfmpegOpener, FrameSourceOpener, HandleTracker, MediaError,
    PersonDetector,
};
use cg_models::AccountId;
use cg_notify::{AlertCooldowns, AlertDispatcher, AlertPolicy, SmsConfig};
use cg_store::{
    open_store, CameraRepository, DocumentStore, GateSettingsRepository, GuardRepository,
    UserRepository,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state.
///
/// The detector and source opener are built once at startup and shared
/// read-only by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn DocumentStore>,
    pub detector: Option<Arc<dyn PersonDetector>>,
    pub sources: Option<Arc<dyn FrameSourceOpener>>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub policy: AlertPolicy,
    pub handles: HandleTracker,
    /// Live-alert cooldowns shared by every feed connection.
    pub alert_cooldowns: AlertCooldowns,
    /// Turns true when the server is shutting down; live feeds end on it.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = open_store(config.store_backend).await?;

        let sms = SmsConfig::from_env();
        let dispatcher = AlertDispatcher::from_config(&sms)?;
        info!(mode = dispatcher.mode().as_str(), "Alert dispatcher ready");

        let handles = HandleTracker::new();
        let sources: Option<Arc<dyn FrameSourceOpener>> = match FfmpegOpener::new(handles.clone()) {
            Ok(opener) => Some(Arc::new(opener)),
            Err(e) => {
                warn!("Video decoding disabled: {}", e);
                None
            }
        };

        let policy = AlertPolicy::from_env();
        info!(
            threshold = policy.default_threshold,
            fallback = ?policy.fallback_estimate,
            "Alert policy loaded"
        );

        Ok(Self::from_parts(config, store, Arc::new(dispatcher))
            .with_policy(policy)
            .with_handles(handles)
            .with_optional_detector(load_default_detector())
            .with_optional_sources(sources))
    }

    /// State without a detector or decoder; add them with the `with_*` builders.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn DocumentStore>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            alert_cooldowns: AlertCooldowns::new(config.live_alert_cooldown),
            config,
            store,
            detector: None,
            sources: None,
            dispatcher,
            policy: AlertPolicy::default(),
            handles: HandleTracker::new(),
            shutdown: watch::channel(false).1,
        }
    }

    pub fn with_detector(self, detector: Arc<dyn PersonDetector>) -> Self {
        self.with_optional_detector(Some(detector))
    }

    pub fn with_sources(self, sources: Arc<dyn FrameSourceOpener>) -> Self {
        self.with_optional_sources(Some(sources))
    }

    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_handles(mut self, handles: HandleTracker) -> Self {
        self.handles = handles;
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn with_optional_detector(mut self, detector: Option<Arc<dyn PersonDetector>>) -> Self {
        self.detector = detector;
        self
    }

    fn with_optional_sources(mut self, sources: Option<Arc<dyn FrameSourceOpener>>) -> Self {
        self.sources = sources;
        self
    }

    /// The shared detector, or 503 when this build has none.
    pub fn require_detector(&self) -> ApiResult<Arc<dyn PersonDetector>> {
        self.detector
            .clone()
            .ok_or(ApiError::Media(MediaError::DetectorUnavailable))
    }

    /// The source opener, or 503 when ffmpeg is missing.
    pub fn require_sources(&self) -> ApiResult<Arc<dyn FrameSourceOpener>> {
        self.sources
            .clone()
            .ok_or(ApiError::Media(MediaError::FfmpegNotFound))
    }

    pub fn guards(&self, account: &AccountId) -> GuardRepository {
        GuardRepository::new(Arc::clone(&self.store), account.clone())
    }

    pub fn cameras(&self, account: &AccountId) -> CameraRepository {
        CameraRepository::new(Arc::clone(&self.store), account.clone())
    }

    pub fn gate_settings(&self, account: &AccountId) -> GateSettingsRepository {
        GateSettingsRepository::new(Arc::clone(&self.store), account.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(Arc::clone(&self.store))
    }
}
