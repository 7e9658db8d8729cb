use std::sync::Arc;

use portaria_core::feed::ChangeFeed;
use portaria_core::repository::GrantRepository;
use tracing::info;

use crate::backend::LocalBackend;
use crate::services::authorization::{CurrentIdentity, GrantService, SessionManager};
use crate::settings::config::Settings;
use crate::stop_flag;

#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub stop_flag: stop_flag::StopFlag,
    pub backend: Arc<LocalBackend>,
    pub identity: CurrentIdentity,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub async fn new() -> anyhow::Result<SharedAppState> {
        let settings = Settings::new()?;
        Self::with_settings(settings).await
    }

    pub async fn with_settings(settings: Settings) -> anyhow::Result<SharedAppState> {
        let backend = LocalBackend::from_settings(&settings.backend, &settings.feed).await?;
        info!(
            "Grant backend ready ({:?}, {})",
            settings.backend.kind, settings.backend.data_file
        );

        Ok(Arc::new(AppState {
            settings,
            stop_flag: stop_flag::StopFlag::new(),
            backend: Arc::new(backend),
            identity: CurrentIdentity::new(),
        }))
    }

    pub fn repository(&self) -> Arc<dyn GrantRepository> {
        self.backend.clone()
    }

    pub fn feed(&self) -> Arc<dyn ChangeFeed> {
        self.backend.clone()
    }

    pub fn grant_service(&self) -> GrantService {
        GrantService::new(self.repository(), self.identity.clone())
    }

    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(
            self.repository(),
            self.feed(),
            self.identity.clone(),
            self.settings.store.clone(),
        )
    }
}
