use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::{gemini, openai};
use rig::streaming::{StreamedAssistantContent, StreamingCompletionResponse};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use crate::events::{Role, StreamEventMapped, StreamEventPayload, StreamTarget};
use crate::model::default_model_for;
use crate::provider::{
    CompletionsFailedSnafu, EmptyMessageSetSnafu, HttpClientSnafu, LlmProvider,
    MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderKind, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, StreamRequest, event_channel,
};

/// Streams chat completions through a rig completion model.
pub struct RigProviderAdapter {
    config: ProviderConfig,
    kind: ProviderKind,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig, kind: ProviderKind) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config, kind })
    }

    fn gemini_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-gemini-client",
        })
    }

    fn openai_client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-openai-client",
        })
    }

    fn to_rig_message(message: &ProviderMessage) -> Option<RigMessage> {
        match message.role {
            Role::System => None,
            Role::User => Some(RigMessage::user(message.content.clone())),
            Role::Assistant => Some(RigMessage::assistant(message.content.clone())),
        }
    }

    fn merged_preamble(request: &StreamRequest) -> Option<String> {
        let mut preamble_parts = Vec::new();

        if let Some(preamble) = &request.preamble
            && !preamble.trim().is_empty()
        {
            preamble_parts.push(preamble.clone());
        }

        // Rig exposes a single preamble field, so system-role messages are folded into it.
        for message in &request.messages {
            if matches!(message.role, Role::System) && !message.content.trim().is_empty() {
                preamble_parts.push(message.content.clone());
            }
        }

        if preamble_parts.is_empty() {
            None
        } else {
            Some(preamble_parts.join("\n\n"))
        }
    }

    async fn open_stream<M>(
        model: M,
        request: &StreamRequest,
    ) -> ProviderResult<StreamingCompletionResponse<M::StreamingResponse>>
    where
        M: CompletionModel,
    {
        let mut messages = request
            .messages
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let Some(prompt) = messages.pop() else {
            tracing::warn!(
                target = ?request.target,
                model_id = %request.model_id,
                total_message_count = request.messages.len(),
                "cannot open stream because no user/assistant messages remain after filtering"
            );
            return EmptyMessageSetSnafu {
                stage: "open-stream-pop-prompt",
                target: request.target,
            }
            .fail();
        };

        let mut builder = model.completion_request(prompt).messages(messages);

        if let Some(preamble) = Self::merged_preamble(request) {
            builder = builder.preamble(preamble);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        target: StreamTarget,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventMapped::new(
            target,
            StreamEventPayload::Error(error.to_string()),
        ));
    }

    fn map_stream_item<R>(
        target: StreamTarget,
        item: StreamedAssistantContent<R>,
    ) -> Option<StreamEventMapped>
    where
        R: Clone + Unpin,
    {
        let payload = match item {
            StreamedAssistantContent::Text(text) => {
                if text.text.is_empty() {
                    return None;
                }
                StreamEventPayload::Delta(text.text)
            }
            // Reasoning traces are not part of the answer shown to the reader.
            StreamedAssistantContent::Reasoning(_)
            | StreamedAssistantContent::ReasoningDelta { .. }
            | StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => return None,
        };

        Some(StreamEventMapped::new(target, payload))
    }

    async fn pump_stream<M>(
        model: M,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) where
        M: CompletionModel,
    {
        let target = request.target;
        let mut stream = match Self::open_stream(model, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    target = ?target,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, target, error);
                return;
            }
        };

        let mut chunk_count = 0usize;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // The receiving session is gone; stop provider IO.
                    tracing::debug!(target = ?target, chunk_count, "provider stream abandoned");
                    stream.cancel();
                    return;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(mapped) = Self::map_stream_item(target, item) {
                                chunk_count += 1;
                                if event_tx.send(mapped).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            tracing::warn!(
                                target = ?target,
                                chunk_count,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, target, error);
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::debug!(target = ?target, chunk_count, "provider stream completed");
        let _ = event_tx.send(StreamEventMapped::new(target, StreamEventPayload::Done));
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        kind: ProviderKind,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let target = request.target;
        let model_id = request.model_id.clone();

        match kind {
            ProviderKind::Gemini => match Self::gemini_client(&config) {
                Ok(client) => {
                    let model = client.completion_model(model_id);
                    Self::pump_stream(model, request, event_tx, cancel_rx).await;
                }
                Err(error) => Self::emit_error_event(&event_tx, target, error),
            },
            ProviderKind::OpenAi => match Self::openai_client(&config) {
                Ok(client) => {
                    let model = client.completion_model(model_id);
                    Self::pump_stream(model, request, event_tx, cancel_rx).await;
                }
                Err(error) => Self::emit_error_event(&event_tx, target, error),
            },
        }
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::Gemini => "Rig Gemini",
            ProviderKind::OpenAi => "Rig OpenAI",
        }
    }

    fn default_model(&self) -> &str {
        default_model_for(self.kind)
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                target: request.target,
            }
        );

        let (event_tx, stream, cancel_rx) = event_channel(request.target);
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            self.kind,
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SessionId, TurnId};

    fn request(messages: Vec<ProviderMessage>) -> StreamRequest {
        StreamRequest::new(
            StreamTarget::new(SessionId::new(1), TurnId::new(1)),
            "gemini-2.5-flash",
            messages,
        )
    }

    #[test]
    fn missing_api_key_is_rejected_at_construction() {
        let result = RigProviderAdapter::new(
            ProviderConfig::new("gemini", "   ", ""),
            ProviderKind::Gemini,
        );
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }

    #[test]
    fn system_messages_are_folded_into_the_preamble() {
        let request = request(vec![
            ProviderMessage::new(Role::System, "stay on topic"),
            ProviderMessage::new(Role::User, "hello"),
        ])
        .with_preamble("answer from the book");

        assert_eq!(
            RigProviderAdapter::merged_preamble(&request).as_deref(),
            Some("answer from the book\n\nstay on topic")
        );
    }

    #[test]
    fn empty_requests_never_spawn_a_worker() {
        let adapter = RigProviderAdapter::new(
            ProviderConfig::new("gemini", "key", ""),
            ProviderKind::Gemini,
        )
        .unwrap();

        let result = adapter.stream_chat(request(Vec::new()));
        assert!(matches!(result, Err(ProviderError::EmptyMessageSet { .. })));
    }
}
