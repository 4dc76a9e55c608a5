use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::ai_assist::AiAssistService;
use crate::services::storage::StorageService;
use crate::services::training_provider::TrainingClient;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    storage: Option<StorageService>,
    ai_assist: Option<AiAssistService>,
    training: Option<TrainingClient>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        storage: Option<StorageService>,
        ai_assist: Option<AiAssistService>,
        training: Option<TrainingClient>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, storage, ai_assist, training }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn ai_assist(&self) -> Option<&AiAssistService> {
        self.inner.ai_assist.as_ref()
    }

    pub(crate) fn training(&self) -> Option<&TrainingClient> {
        self.inner.training.as_ref()
    }
}
