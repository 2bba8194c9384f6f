use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::acquire::ModelAcquisition;
use crate::engine::{ChatEngine, LlamaServerEngine};
use crate::error::FetchError;
use crate::fetch::HttpFetcher;
use crate::settings::Settings;

/// Everything a request handler needs, built once in main and handed to
/// every handler through axum's `State`. No ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub acquisition: Arc<ModelAcquisition>,
    engine: Arc<OnceCell<Arc<dyn ChatEngine>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, FetchError> {
        let settings = Arc::new(settings);
        let fetcher = Arc::new(HttpFetcher::new(&settings.model_uri, settings.insecure_tls)?);
        let acquisition = Arc::new(ModelAcquisition::new(fetcher, settings.model_path()));

        Ok(Self {
            settings,
            acquisition,
            engine: Arc::new(OnceCell::new()),
        })
    }

    /// State with a pre-built engine, for callers that already hold one.
    pub fn with_engine(
        settings: Settings,
        engine: Arc<dyn ChatEngine>,
    ) -> Result<Self, FetchError> {
        let mut state = Self::new(settings)?;
        state.engine = Arc::new(OnceCell::new_with(Some(engine)));
        Ok(state)
    }

    /// The process-wide generation engine. Construction is deferred to the
    /// first call and the instance is shared by every later one.
    pub async fn engine(&self) -> Arc<dyn ChatEngine> {
        self.engine
            .get_or_init(|| async {
                tracing::info!(
                    url = %self.settings.engine_url,
                    format = ?self.settings.chat_format,
                    "initializing generation engine"
                );
                Arc::new(LlamaServerEngine::new(
                    self.settings.engine_url.clone(),
                    self.settings.chat_format,
                )) as Arc<dyn ChatEngine>
            })
            .await
            .clone()
    }
}
