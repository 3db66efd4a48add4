use std::sync::Arc;

use biblio_llm::{
    LlmProvider, ProviderEventStream, ProviderMessage, ProviderResult, ProviderStreamHandle,
    Role as ProviderRole, SessionId, StreamEventMapped, StreamEventPayload, StreamRequest,
    StreamTarget, TurnId,
};

use crate::document::Document;
use crate::error::ChatError;
use crate::message::{Message, MessageId, MessageStatus, Role, StreamState, StreamTransition};
use crate::prompt::{self, FAILURE_REPLY};

/// Live connection to the hosted model for one document.
///
/// History only grows with completed turns that produced text; failed turns are never replayed.
pub struct ChatHandle {
    provider: Arc<dyn LlmProvider>,
    model_id: String,
    system_instruction: String,
    history: Vec<ProviderMessage>,
}

impl ChatHandle {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model_id: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            system_instruction: system_instruction.into(),
            history: Vec::new(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    fn request(&self, target: StreamTarget, user_text: &str) -> StreamRequest {
        let mut messages = self.history.clone();
        messages.push(ProviderMessage::new(ProviderRole::User, user_text));

        StreamRequest::new(target, self.model_id.clone(), messages)
            .with_preamble(self.system_instruction.clone())
    }

    fn record_turn(&mut self, user_text: String, reply: String) {
        self.history
            .push(ProviderMessage::new(ProviderRole::User, user_text));
        self.history
            .push(ProviderMessage::new(ProviderRole::Assistant, reply));
    }
}

/// Turn metadata kept outside the transcript.
#[derive(Debug, Clone)]
struct ActiveTurn {
    target: StreamTarget,
    placeholder_id: MessageId,
    user_text: String,
}

/// One document-scoped conversation.
///
/// Dropping the session drops its chat handle; an in-flight stream stops once its
/// event receiver is dropped by the caller.
pub struct Session {
    id: SessionId,
    document: Document,
    messages: Vec<Message>,
    chat: Option<ChatHandle>,
    configuration_error: Option<ChatError>,
    stream_state: StreamState,
    active_turn: Option<ActiveTurn>,
    next_message_id: u64,
    next_turn_id: u64,
}

impl Session {
    /// Opens a conversation about `document`.
    ///
    /// A provider error leaves the session inert with a single model entry describing it.
    pub fn open(
        id: SessionId,
        document: Document,
        provider: ProviderResult<Arc<dyn LlmProvider>>,
        model_id: Option<String>,
    ) -> Self {
        let mut session = Self {
            id,
            document,
            messages: Vec::new(),
            chat: None,
            configuration_error: None,
            stream_state: StreamState::Idle,
            active_turn: None,
            next_message_id: 1,
            next_turn_id: 1,
        };

        match provider {
            Ok(provider) => {
                let model_id = model_id
                    .map(|model_id| model_id.trim().to_string())
                    .filter(|model_id| !model_id.is_empty())
                    .unwrap_or_else(|| provider.default_model().to_string());
                let instruction = prompt::system_instruction(session.document.content());

                tracing::info!(
                    session_id = ?id,
                    provider = %provider.name(),
                    model_id = %model_id,
                    title = %session.document.title(),
                    "opened document chat"
                );

                session.chat = Some(ChatHandle::new(provider, model_id, instruction));
                let greeting = prompt::greeting(session.document.title());
                session.push_message(Role::Model, greeting, MessageStatus::Done);
            }
            Err(source) => {
                tracing::error!(session_id = ?id, error = %source, "failed to open document chat");
                let error = ChatError::Configuration {
                    stage: "open-session",
                    source,
                };
                let text = error.user_message();
                session.push_message(
                    Role::Model,
                    text,
                    MessageStatus::Error(error.to_string()),
                );
                session.configuration_error = Some(error);
            }
        }

        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chat(&self) -> Option<&ChatHandle> {
        self.chat.as_ref()
    }

    pub fn configuration_error(&self) -> Option<&ChatError> {
        self.configuration_error.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_state.is_streaming()
    }

    /// False while a reply is streaming and forever for sessions without a chat handle.
    pub fn can_send(&self) -> bool {
        self.chat.is_some() && !self.is_streaming()
    }

    /// Starts a turn.
    ///
    /// Returns `None` without touching the transcript when `text` is blank, a reply is
    /// still streaming, or there is no chat handle. On acceptance the user message and an
    /// empty model placeholder are appended and the caller receives the provider stream;
    /// its worker must be spawned and its events fed to [`Session::apply_stream_event`].
    /// A provider that refuses the request fails the turn at once and also yields `None`.
    pub fn send_message(&mut self, text: &str) -> Option<ProviderStreamHandle> {
        if text.trim().is_empty() || !self.can_send() {
            return None;
        }

        let target = StreamTarget::new(self.id, TurnId::new(self.next_turn_id));
        self.stream_state = self
            .stream_state
            .apply(StreamTransition::Start(target))
            .ok()?;
        self.next_turn_id = self.next_turn_id.saturating_add(1);

        self.push_message(Role::User, text, MessageStatus::Done);
        let placeholder_id = self.alloc_message_id();
        self.messages
            .push(Message::model_placeholder(placeholder_id, target.turn_id));
        self.active_turn = Some(ActiveTurn {
            target,
            placeholder_id,
            user_text: text.to_string(),
        });

        let request = self.chat.as_ref()?.request(target, text);
        let stream_result = self.chat.as_ref()?.provider.stream_chat(request);

        match stream_result {
            Ok(handle) => {
                tracing::debug!(target = ?target, "turn started");
                Some(handle)
            }
            Err(error) => {
                self.fail_turn(target, error.to_string());
                None
            }
        }
    }

    /// Applies one provider event. Returns true when the transcript changed.
    ///
    /// Chunks are appended in the order they are applied; events for any turn other than
    /// the active one are ignored.
    pub fn apply_stream_event(&mut self, event: StreamEventMapped) -> bool {
        if !self.stream_state.accepts_stream_event(event.target) {
            tracing::trace!(target = ?event.target, "ignoring stale stream event");
            return false;
        }

        match event.payload {
            StreamEventPayload::Delta(chunk) => {
                let Some(placeholder) = self.placeholder_mut() else {
                    return false;
                };
                placeholder.text.push_str(&chunk);
                true
            }
            StreamEventPayload::Done => self.complete_turn(event.target),
            StreamEventPayload::Error(message) => self.fail_turn(event.target, message),
        }
    }

    /// Handles a stream that closed without `Done` or `Error`.
    pub fn handle_stream_closed(&mut self, target: StreamTarget) -> bool {
        if !self.stream_state.accepts_stream_event(target) {
            return false;
        }

        self.fail_turn(
            target,
            "provider stream ended before a terminal event".to_string(),
        )
    }

    /// Feeds every event of `stream` into the session until the turn ends.
    pub async fn pump(&mut self, mut stream: ProviderEventStream) {
        let target = stream.target();

        while let Some(event) = stream.recv().await {
            let terminal = event.is_terminal();
            self.apply_stream_event(event);
            if terminal {
                return;
            }
        }

        self.handle_stream_closed(target);
    }

    fn complete_turn(&mut self, target: StreamTarget) -> bool {
        let Some(turn) = self.take_turn(target) else {
            return false;
        };
        if let Ok(state) = self.stream_state.apply(StreamTransition::Complete(target)) {
            self.stream_state = state;
        }

        let Some(message) = self.message_mut(turn.placeholder_id) else {
            return false;
        };
        message.status = MessageStatus::Done;
        let reply = message.text.clone();

        tracing::debug!(target = ?target, reply_len = reply.len(), "turn completed");

        // Empty replies (blocked or filtered answers) would poison every later request.
        if reply.trim().is_empty() {
            tracing::warn!(target = ?target, "empty reply left out of history");
        } else if let Some(chat) = self.chat.as_mut() {
            chat.record_turn(turn.user_text, reply);
        }
        true
    }

    fn fail_turn(&mut self, target: StreamTarget, details: String) -> bool {
        let Some(turn) = self.take_turn(target) else {
            return false;
        };
        let error = ChatError::Request {
            stage: "stream-reply",
            details,
        };
        tracing::warn!(target = ?target, error = %error, "turn failed");

        let transition = StreamTransition::Fail {
            target,
            message: error.to_string(),
        };
        if let Ok(state) = self.stream_state.apply(transition) {
            self.stream_state = state;
        }

        let Some(message) = self.message_mut(turn.placeholder_id) else {
            return false;
        };
        // Partial text is discarded so the turn ends with exactly one failure entry.
        message.text = FAILURE_REPLY.to_string();
        message.status = MessageStatus::Error(error.to_string());
        true
    }

    fn take_turn(&mut self, target: StreamTarget) -> Option<ActiveTurn> {
        match &self.active_turn {
            Some(turn) if turn.target == target => self.active_turn.take(),
            _ => None,
        }
    }

    fn placeholder_mut(&mut self) -> Option<&mut Message> {
        let placeholder_id = self.active_turn.as_ref()?.placeholder_id;
        self.message_mut(placeholder_id)
    }

    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|message| message.id == id)
    }

    fn push_message(
        &mut self,
        role: Role,
        text: impl Into<String>,
        status: MessageStatus,
    ) -> MessageId {
        let id = self.alloc_message_id();
        self.messages.push(Message::new(id, role, text, status));
        id
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use biblio_llm::{ProviderError, event_channel};

    use super::*;
    use crate::document::DocumentKind;
    use crate::prompt::CONFIGURATION_ERROR_REPLY;

    /// Replays a fixed list of payloads for every request and records the requests.
    struct ScriptedProvider {
        script: Vec<StreamEventPayload>,
        requests: Arc<Mutex<Vec<StreamRequest>>>,
        reject: bool,
    }

    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
            self.requests.lock().unwrap().push(request.clone());
            if self.reject {
                return Err(ProviderError::EmptyMessageSet {
                    stage: "scripted",
                    target: request.target,
                });
            }

            let target = request.target;
            let (event_tx, stream, _cancel_rx) = event_channel(target);
            let script = self.script.clone();
            let worker = Box::pin(async move {
                for payload in script {
                    let _ = event_tx.send(StreamEventMapped::new(target, payload));
                }
            });

            Ok(ProviderStreamHandle { stream, worker })
        }
    }

    fn delta(text: &str) -> StreamEventPayload {
        StreamEventPayload::Delta(text.to_string())
    }

    fn document() -> Document {
        Document::new(
            "lighthouse.txt",
            "The keeper lit the lamp at dusk.",
            DocumentKind::PlainText,
            None,
        )
    }

    fn open_with(
        script: Vec<StreamEventPayload>,
        reject: bool,
    ) -> (Session, Arc<Mutex<Vec<StreamRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider {
            script,
            requests: requests.clone(),
            reject,
        });
        let session = Session::open(SessionId::new(1), document(), Ok(provider), None);
        (session, requests)
    }

    async fn run_turn(session: &mut Session, text: &str) {
        let ProviderStreamHandle { stream, worker } =
            session.send_message(text).expect("turn should be accepted");
        worker.await;
        session.pump(stream).await;
    }

    #[test]
    fn opening_greets_with_the_title_and_embeds_the_document() {
        let (session, _) = open_with(Vec::new(), false);

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::Model);
        assert_eq!(
            session.messages()[0].text,
            "I've finished reading \"lighthouse.txt\". What would you like to know?"
        );

        let chat = session.chat().expect("chat handle");
        assert_eq!(chat.model_id(), "scripted-model");
        assert!(
            chat.system_instruction()
                .contains("---START OF BOOK---\n\nThe keeper lit the lamp at dusk.\n\n---END OF BOOK---")
        );
        assert!(session.can_send());
    }

    #[test]
    fn blank_messages_are_ignored() {
        let (mut session, requests) = open_with(vec![StreamEventPayload::Done], false);

        assert!(session.send_message("").is_none());
        assert!(session.send_message("  \n\t ").is_none());

        assert_eq!(session.messages().len(), 1);
        assert!(requests.lock().unwrap().is_empty());
        assert!(!session.is_streaming());
    }

    #[test]
    fn second_send_while_streaming_is_a_no_op() {
        let (mut session, requests) = open_with(vec![StreamEventPayload::Done], false);

        let first = session.send_message("Who lit the lamp?");
        assert!(first.is_some());
        assert!(!session.can_send());

        assert!(session.send_message("And when?").is_none());
        assert_eq!(session.messages().len(), 3);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chunks_accumulate_in_arrival_order() {
        let (mut session, _) = open_with(
            vec![
                delta("The keeper"),
                delta(" lit it"),
                delta(" at dusk."),
                StreamEventPayload::Done,
            ],
            false,
        );

        run_turn(&mut session, "Who lit the lamp?").await;

        let messages = session.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].text, "Who lit the lamp?");
        assert_eq!(messages[2].role, Role::Model);
        assert_eq!(messages[2].text, "The keeper lit it at dusk.");
        assert_eq!(messages[2].status, MessageStatus::Done);
        assert!(session.can_send());
    }

    #[tokio::test]
    async fn failed_stream_leaves_one_failure_entry() {
        let (mut session, _) = open_with(
            vec![delta("The kee"), StreamEventPayload::Error("503".to_string())],
            false,
        );

        run_turn(&mut session, "Who lit the lamp?").await;

        let messages = session.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::Model);
        assert_eq!(messages[2].text, FAILURE_REPLY);
        assert!(matches!(messages[2].status, MessageStatus::Error(_)));
        assert!(messages.iter().all(|message| !message.is_streaming()));
        assert!(session.can_send());
    }

    #[tokio::test]
    async fn stream_closing_without_terminal_event_is_a_failure() {
        let (mut session, _) = open_with(vec![delta("half an ans")], false);

        run_turn(&mut session, "Who lit the lamp?").await;

        assert_eq!(session.messages()[2].text, FAILURE_REPLY);
        assert!(!session.is_streaming());
    }

    #[test]
    fn provider_refusing_the_request_fails_the_turn_immediately() {
        let (mut session, requests) = open_with(Vec::new(), true);

        assert!(session.send_message("Who lit the lamp?").is_none());

        assert_eq!(requests.lock().unwrap().len(), 1);
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[2].text, FAILURE_REPLY);
        assert!(session.can_send());
    }

    #[tokio::test]
    async fn completed_turns_become_history_and_failed_turns_do_not() {
        let (mut session, requests) =
            open_with(vec![delta("At dusk."), StreamEventPayload::Done], false);

        run_turn(&mut session, "When?").await;
        run_turn(&mut session, "Who?").await;

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].messages,
            vec![ProviderMessage::new(ProviderRole::User, "When?")]
        );
        assert_eq!(
            requests[1].messages,
            vec![
                ProviderMessage::new(ProviderRole::User, "When?"),
                ProviderMessage::new(ProviderRole::Assistant, "At dusk."),
                ProviderMessage::new(ProviderRole::User, "Who?"),
            ]
        );
        assert_eq!(
            requests[1].preamble.as_deref(),
            session.chat().map(ChatHandle::system_instruction)
        );
    }

    #[tokio::test]
    async fn empty_replies_are_not_replayed() {
        let (mut session, requests) = open_with(vec![StreamEventPayload::Done], false);

        run_turn(&mut session, "When?").await;
        assert_eq!(session.messages()[2].text, "");
        assert_eq!(session.messages()[2].status, MessageStatus::Done);

        run_turn(&mut session, "Who?").await;

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].messages,
            vec![ProviderMessage::new(ProviderRole::User, "Who?")]
        );
        assert!(
            requests[1]
                .messages
                .iter()
                .all(|message| !message.content.trim().is_empty())
        );
    }

    #[tokio::test]
    async fn stale_events_do_not_touch_the_transcript() {
        let (mut session, _) = open_with(vec![StreamEventPayload::Done], false);
        let handle = session.send_message("Who?").expect("accepted");

        let stale = StreamEventMapped::new(
            StreamTarget::new(SessionId::new(99), TurnId::new(1)),
            delta("leak"),
        );
        assert!(!session.apply_stream_event(stale));
        assert!(session.messages()[2].is_awaiting_first_chunk());

        handle.worker.await;
        session.pump(handle.stream).await;
        assert_eq!(session.messages()[2].text, "");
        assert_eq!(session.messages()[2].status, MessageStatus::Done);
    }

    #[test]
    fn missing_credentials_leave_an_inert_session() {
        let provider = Err(ProviderError::MissingApiKey {
            stage: "test",
            provider_id: "gemini".to_string(),
        });
        let mut session = Session::open(SessionId::new(2), document(), provider, None);

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::Model);
        assert!(session.messages()[0].text.starts_with(CONFIGURATION_ERROR_REPLY));
        assert!(session.chat().is_none());
        assert!(session.configuration_error().is_some());
        assert!(!session.can_send());

        assert!(session.send_message("Hello?").is_none());
        assert_eq!(session.messages().len(), 1);
    }
}
