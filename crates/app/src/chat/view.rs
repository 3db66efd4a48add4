use std::time::Duration;

use biblio_core::{Session, prompt};
use biblio_llm::{ProviderEventStream, ProviderStreamHandle, ProviderWorker, StreamEventMapped};
use gpui::*;
use gpui_component::{ActiveTheme, v_flex};
use gpui_tokio_bridge::Tokio;

use crate::chat::events::Submit;
use crate::chat::{MessageInput, MessageList};

pub const STREAM_DEBOUNCE_MS: u64 = 50;

/// Coordinates one document session with its transcript and input.
///
/// Chunks are applied to the session as they arrive; only the list refresh is debounced.
pub struct ChatView {
    session: Session,
    message_list: Entity<MessageList>,
    message_input: Entity<MessageInput>,
    stream_worker_task: Option<Task<Result<(), gpui_tokio_bridge::JoinError>>>,
    stream_reader_task: Option<Task<()>>,
    stream_debounce_task: Option<Task<()>>,
}

impl ChatView {
    pub fn new(session: Session, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let message_list = cx.new(MessageList::new);
        let placeholder = SharedString::from(prompt::input_placeholder(session.document().title()));
        let message_input = cx.new(|cx| MessageInput::new(placeholder, window, cx));

        cx.subscribe(&message_input, |this, _, event: &Submit, cx| {
            this.handle_submit(event.clone(), cx);
        })
        .detach();

        let mut this = Self {
            session,
            message_list,
            message_input,
            stream_worker_task: None,
            stream_reader_task: None,
            stream_debounce_task: None,
        };
        this.sync_messages(cx);
        this.message_input
            .update(cx, |input, cx| input.focus(window, cx));
        this
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn handle_submit(&mut self, event: Submit, cx: &mut Context<Self>) {
        let handle = self.session.send_message(&event.content);
        if let Some(handle) = handle {
            self.spawn_stream_pipeline(handle, cx);
        }

        self.sync_messages(cx);
    }

    fn spawn_stream_pipeline(&mut self, handle: ProviderStreamHandle, cx: &mut Context<Self>) {
        self.spawn_stream_worker(handle.worker, cx);
        self.spawn_stream_reader(handle.stream, cx);
    }

    fn spawn_stream_worker(&mut self, worker: ProviderWorker, cx: &mut Context<Self>) {
        self.stream_worker_task = Some(Tokio::spawn(cx, worker));
    }

    fn spawn_stream_reader(&mut self, mut stream: ProviderEventStream, cx: &mut Context<Self>) {
        let stream_target = stream.target();

        self.stream_reader_task = Some(cx.spawn(async move |this, cx| {
            while let Some(event) = stream.recv().await {
                let terminal = event.is_terminal();
                let _ = this.update(cx, |this, cx| {
                    this.handle_stream_event(event, cx);
                });
                if terminal {
                    return;
                }
            }

            let _ = this.update(cx, |this, cx| {
                if this.session.handle_stream_closed(stream_target) {
                    this.finish_stream(cx);
                }
            });
        }));
    }

    fn handle_stream_event(&mut self, event: StreamEventMapped, cx: &mut Context<Self>) {
        let terminal = event.is_terminal();
        if !self.session.apply_stream_event(event) {
            return;
        }

        if terminal {
            self.finish_stream(cx);
        } else {
            self.schedule_debounced_sync(cx);
        }
    }

    fn finish_stream(&mut self, cx: &mut Context<Self>) {
        self.stream_debounce_task = None;
        self.stream_worker_task = None;
        self.sync_messages(cx);
    }

    fn schedule_debounced_sync(&mut self, cx: &mut Context<Self>) {
        if self.stream_debounce_task.is_some() {
            return;
        }

        self.stream_debounce_task = Some(cx.spawn(async move |this, cx| {
            cx.background_executor()
                .timer(Duration::from_millis(STREAM_DEBOUNCE_MS))
                .await;

            let _ = this.update(cx, |this, cx| {
                this.stream_debounce_task = None;
                this.sync_messages(cx);
            });
        }));
    }

    fn sync_messages(&mut self, cx: &mut Context<Self>) {
        let messages = self.session.messages().to_vec();
        let can_send = self.session.can_send();

        self.message_list
            .update(cx, |list, cx| list.set_messages(messages, cx));
        self.message_input
            .update(cx, |input, cx| input.set_enabled(can_send, cx));
        cx.notify();
    }
}

impl Render for ChatView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .id("chat-view")
            .size_full()
            .min_h_0()
            .bg(theme.background)
            .child(
                div()
                    .flex_1()
                    .min_h_0()
                    .w_full()
                    .child(self.message_list.clone()),
            )
            .child(self.message_input.clone())
    }
}
