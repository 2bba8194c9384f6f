pub mod acquire;
pub mod api;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod settings;
pub mod state;

pub use acquire::{AcquirePhase, ModelAcquisition};
pub use engine::{ChatEngine, ChatFormat, ChatMessage, FragmentStream, GenerationRequest};
pub use error::{FetchError, GenerationError};
pub use fetch::HttpFetcher;
pub use llm::LlmService;
pub use settings::Settings;
pub use state::AppState;
