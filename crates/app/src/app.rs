use std::path::PathBuf;

use biblio_core::Session;
use biblio_llm::SessionId;
use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use crate::chat::ChatView;
use crate::settings::Settings;
use crate::upload::{DocumentLoaded, UploadView};

pub const APP_NAME: &str = "Biblio";

#[cfg(target_os = "macos")]
const WINDOW_TOOLBAR_LEFT_SAFE_PADDING: f32 = 78.0;
#[cfg(not(target_os = "macos"))]
const WINDOW_TOOLBAR_LEFT_SAFE_PADDING: f32 = 16.0;

gpui::actions!(shell, [NewBook, Quit]);

/// Top toolbar height, scaled with the user's rem size.
fn window_toolbar_height(window: &Window) -> Pixels {
    (1.75 * window.rem_size()).max(px(34.0))
}

/// Which pane the shell shows.
enum Screen {
    Upload(Entity<UploadView>),
    Chat(Entity<ChatView>),
}

/// Root view: header plus either the upload pane or the chat pane.
///
/// Replacing the chat pane drops its session, which also stops any in-flight reply.
pub struct BiblioShell {
    settings: Settings,
    screen: Screen,
    next_session_id: u64,
    title_bar_should_move: bool,
}

impl BiblioShell {
    pub fn new(
        settings: Settings,
        initial_path: Option<PathBuf>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let upload = Self::new_upload_view(window, cx);
        if let Some(path) = initial_path {
            upload.update(cx, |upload, cx| upload.open_path(path, cx));
        }

        Self {
            settings,
            screen: Screen::Upload(upload),
            next_session_id: 1,
            title_bar_should_move: false,
        }
    }

    fn new_upload_view(window: &mut Window, cx: &mut Context<Self>) -> Entity<UploadView> {
        let upload = cx.new(|cx| UploadView::new(window, cx));
        cx.subscribe_in(
            &upload,
            window,
            |this, _, event: &DocumentLoaded, window, cx| {
                this.open_session(event.document.clone(), window, cx);
            },
        )
        .detach();
        upload
    }

    fn open_session(
        &mut self,
        document: biblio_core::Document,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        let session_id = SessionId::new(self.next_session_id);
        self.next_session_id = self.next_session_id.saturating_add(1);

        let session = Session::open(
            session_id,
            document,
            self.settings.open_provider(),
            self.settings.model_override(),
        );
        let chat = cx.new(|cx| ChatView::new(session, window, cx));
        self.screen = Screen::Chat(chat);
        cx.notify();
    }

    /// Discards the current session and returns to the upload pane.
    pub fn new_book(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if matches!(self.screen, Screen::Upload(_)) {
            return;
        }

        tracing::info!("starting over with a new book");
        self.screen = Screen::Upload(Self::new_upload_view(window, cx));
        cx.notify();
    }

    fn render_top_bar(&self, toolbar_height: Pixels, cx: &Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let title = match &self.screen {
            Screen::Chat(chat) => Some(chat.read(cx).session().document().title().to_string()),
            Screen::Upload(_) => None,
        };
        let in_session = title.is_some();

        h_flex()
            .id("app-top-bar")
            .window_control_area(WindowControlArea::Drag)
            .on_mouse_down_out(cx.listener(|this, _, _window, _cx| {
                this.title_bar_should_move = false;
            }))
            .on_mouse_up(
                MouseButton::Left,
                cx.listener(|this, _, _window, _cx| {
                    this.title_bar_should_move = false;
                }),
            )
            .on_mouse_down(
                MouseButton::Left,
                cx.listener(|this, _, _window, _cx| {
                    this.title_bar_should_move = true;
                }),
            )
            .on_mouse_move(cx.listener(|this, _, window, _cx| {
                if this.title_bar_should_move {
                    this.title_bar_should_move = false;
                    window.start_window_move();
                }
            }))
            .w_full()
            .h(toolbar_height)
            .flex_shrink_0()
            .pl(px(WINDOW_TOOLBAR_LEFT_SAFE_PADDING))
            .pr_4()
            .gap_3()
            .items_center()
            .justify_between()
            .bg(theme.background)
            .border_b_1()
            .border_color(theme.border)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .font_weight(FontWeight::SEMIBOLD)
                            .text_color(theme.foreground)
                            .child(APP_NAME),
                    )
                    .when_some(title, |row, title| {
                        row.child(
                            div()
                                .text_sm()
                                .text_color(theme.muted_foreground)
                                .child(title),
                        )
                    }),
            )
            .when(in_session, |bar| {
                bar.child(
                    Button::new("new-book")
                        .ghost()
                        .small()
                        .icon(IconName::Plus)
                        .child("New Book")
                        .on_click(cx.listener(|this, _, window, cx| {
                            this.new_book(window, cx);
                        })),
                )
            })
    }
}

impl Render for BiblioShell {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let toolbar_height = window_toolbar_height(window);
        let content = match &self.screen {
            Screen::Upload(upload) => upload.clone().into_any_element(),
            Screen::Chat(chat) => chat.clone().into_any_element(),
        };

        v_flex()
            .id("app-shell")
            .size_full()
            .bg(theme.background)
            .on_action(cx.listener(|this, _: &NewBook, window, cx| {
                this.new_book(window, cx);
            }))
            .child(self.render_top_bar(toolbar_height, cx))
            .child(
                div()
                    .id("main-content")
                    .flex_1()
                    .w_full()
                    .min_h_0()
                    .overflow_hidden()
                    .child(content),
            )
    }
}
