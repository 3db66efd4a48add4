use std::sync::Arc;

mod events;
mod model;
mod provider;
mod rig_adapter;

pub use events::{
    Role, SessionId, StreamEventMapped, StreamEventPayload, StreamTarget, TurnId,
};
pub use model::{DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, default_model_for};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderKind,
    ProviderMessage, ProviderResult, ProviderStreamHandle, ProviderWorker, StreamRequest,
    event_channel,
};
pub use rig_adapter::RigProviderAdapter;

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    let Some(kind) = ProviderKind::parse(&config.provider_id) else {
        return Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        });
    };

    config.provider_id = kind.id().to_string();
    Ok(Arc::new(RigProviderAdapter::new(config, kind)?))
}
