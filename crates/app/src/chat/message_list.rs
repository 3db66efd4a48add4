use biblio_core::{Message, MessageStatus, Role};
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{ActiveTheme, h_flex, label::Label, v_flex};

use crate::chat::scroll_manager::ScrollManager;

const BUBBLE_MAX_WIDTH: Pixels = px(560.);
const BUBBLE_PADDING_X: Pixels = px(14.);
const BUBBLE_PADDING_Y: Pixels = px(10.);
const TYPING_INDICATOR: &str = "...";

pub struct MessageList {
    messages: Vec<Message>,
    scroll_manager: ScrollManager,
}

impl MessageList {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self {
            messages: Vec::new(),
            scroll_manager: ScrollManager::new(),
        }
    }

    pub fn set_messages(&mut self, messages: Vec<Message>, cx: &mut Context<Self>) {
        let grew = messages.len() > self.messages.len();
        let streaming = messages.iter().any(Message::is_streaming);

        self.messages = messages;
        if grew {
            self.scroll_manager.request_scroll_to_bottom();
        } else if streaming {
            self.scroll_manager.request_scroll_to_bottom_if_following();
        }

        cx.notify();
    }

    fn render_message_row(&self, message: &Message, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let is_user = message.role == Role::User;
        let failed = matches!(message.status, MessageStatus::Error(_));

        let (background, foreground) = if is_user {
            (theme.accent, theme.accent_foreground)
        } else {
            (theme.muted, theme.foreground)
        };

        h_flex()
            .id(ElementId::Name(SharedString::from(format!(
                "message-{}",
                message.id.0
            ))))
            .w_full()
            .when(is_user, |row| row.justify_end())
            .when(!is_user, |row| row.justify_start())
            .child(
                div()
                    .max_w(BUBBLE_MAX_WIDTH)
                    .px(BUBBLE_PADDING_X)
                    .py(BUBBLE_PADDING_Y)
                    .rounded_lg()
                    .bg(background)
                    .text_color(foreground)
                    .when(failed, |bubble| bubble.text_color(theme.danger))
                    .child(Label::new(display_text(message)).text_sm()),
            )
            .into_any_element()
    }
}

/// Text shown for one entry; an empty streaming placeholder shows a typing indicator.
fn display_text(message: &Message) -> SharedString {
    if message.is_awaiting_first_chunk() {
        SharedString::from(TYPING_INDICATOR)
    } else {
        SharedString::from(message.text.clone())
    }
}

impl Render for MessageList {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.scroll_manager.update_follow_state();
        self.scroll_manager.apply_pending_scroll();

        let rows = self
            .messages
            .iter()
            .map(|message| self.render_message_row(message, cx))
            .collect::<Vec<_>>();

        v_flex().size_full().min_h_0().child(
            v_flex()
                .id("message-list")
                .size_full()
                .overflow_y_scroll()
                .track_scroll(self.scroll_manager.handle())
                .px_4()
                .py_3()
                .gap_4()
                .children(rows),
        )
    }
}

#[cfg(test)]
mod tests {
    use biblio_core::MessageId;
    use biblio_llm::TurnId;

    use super::*;

    #[test]
    fn empty_placeholder_shows_typing_indicator() {
        let mut placeholder = Message::model_placeholder(MessageId::new(2), TurnId::new(1));
        assert_eq!(display_text(&placeholder).as_ref(), TYPING_INDICATOR);

        placeholder.text.push_str("The keeper");
        assert_eq!(display_text(&placeholder).as_ref(), "The keeper");

        let done = Message::new(MessageId::new(3), Role::Model, "", MessageStatus::Done);
        assert_eq!(display_text(&done).as_ref(), "");
    }
}
