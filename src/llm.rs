use std::sync::Arc;

use crate::engine::{ChatEngine, ChatMessage, FragmentStream, GenerationRequest};

pub const DEFAULT_MAX_TOKENS: u32 = 200;

/// Adapts a conversation history into the engine's request shape and hands
/// back its fragment stream. Fragments flow through untouched: no buffering
/// ahead of the first one, empty ones included.
pub struct LlmService {
    engine: Arc<dyn ChatEngine>,
}

impl LlmService {
    pub fn new(engine: Arc<dyn ChatEngine>) -> Self {
        Self { engine }
    }

    pub fn generate(
        &self,
        history: Vec<ChatMessage>,
        max_tokens: u32,
        stop: Vec<String>,
    ) -> FragmentStream {
        self.engine.stream_chat(GenerationRequest {
            history,
            max_tokens,
            stop,
        })
    }
}
