use std::path::PathBuf;

use biblio_core::{
    Document, IngestError, IngestHandle, IngestProgress, IngestResult, SourceFile, spawn_ingest,
};
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, Disableable,
    button::{Button, ButtonVariants},
    label::Label,
    v_flex,
};
use gpui_tokio_bridge::Tokio;

/// Emitted once a file has been turned into a document.
#[derive(Debug, Clone)]
pub struct DocumentLoaded {
    pub document: Document,
}

/// Progress of the current upload.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UploadStatus {
    Idle,
    Working(String),
    Failed(String),
}

/// File intake: drop zone, file picker and ingestion progress.
pub struct UploadView {
    status: UploadStatus,
    ingest_task: Option<Task<()>>,
}

impl EventEmitter<DocumentLoaded> for UploadView {}

impl UploadView {
    pub fn new(_window: &mut Window, _cx: &mut Context<Self>) -> Self {
        Self {
            status: UploadStatus::Idle,
            ingest_task: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.status, UploadStatus::Working(_))
    }

    /// Reads `path` and ingests it off the UI thread. Ignored while another file is loading.
    pub fn open_path(&mut self, path: PathBuf, cx: &mut Context<Self>) {
        if self.is_busy() {
            return;
        }

        tracing::info!(path = ?path, "loading document");
        self.status = UploadStatus::Working(IngestProgress::opening(&path).to_string());
        cx.notify();

        let load = Tokio::spawn(cx, async move { SourceFile::load(&path).await });
        self.ingest_task = Some(cx.spawn(async move |this, cx| {
            let loaded = match load.await {
                Ok(loaded) => loaded,
                Err(error) => {
                    tracing::error!(error = %error, "file loading task stopped");
                    let _ = this.update(cx, |this, cx| {
                        this.fail("Failed to read the file.".to_string(), cx);
                    });
                    return;
                }
            };

            let file = match loaded {
                Ok(file) => file,
                Err(error) => {
                    let _ = this.update(cx, |this, cx| this.fail_ingest(&error, cx));
                    return;
                }
            };

            let name = file.name.clone();
            let IngestHandle {
                mut progress,
                worker,
            } = spawn_ingest(file);
            let worker = match this.update(cx, |_, cx| Tokio::spawn(cx, worker)) {
                Ok(worker) => worker,
                Err(_) => return,
            };

            while let Some(update) = progress.recv().await {
                let _ = this.update(cx, |this, cx| {
                    this.status = UploadStatus::Working(update.to_string());
                    cx.notify();
                });
            }

            let result: IngestResult<Document> = match worker.await {
                Ok(result) => result,
                Err(error) => Err(IngestError::Worker {
                    stage: "await-ingest",
                    name,
                    details: error.to_string(),
                }),
            };
            let _ = this.update(cx, |this, cx| this.finish_ingest(result, cx));
        }));
    }

    fn choose_file(&mut self, cx: &mut Context<Self>) {
        if self.is_busy() {
            return;
        }

        let paths = cx.prompt_for_paths(PathPromptOptions {
            files: true,
            directories: false,
            multiple: false,
            prompt: None,
        });

        cx.spawn(async move |this, cx| {
            let Ok(Ok(Some(paths))) = paths.await else {
                return;
            };
            let Some(path) = paths.into_iter().next() else {
                return;
            };
            let _ = this.update(cx, |this, cx| this.open_path(path, cx));
        })
        .detach();
    }

    fn handle_drop(&mut self, paths: &ExternalPaths, cx: &mut Context<Self>) {
        if let Some(path) = paths.paths().first() {
            self.open_path(path.clone(), cx);
        }
    }

    fn finish_ingest(&mut self, result: IngestResult<Document>, cx: &mut Context<Self>) {
        self.ingest_task = None;

        match result {
            Ok(document) => {
                tracing::info!(
                    title = %document.title(),
                    media_type = document.kind().media_type(),
                    chars = document.content().len(),
                    "document ready"
                );
                self.status = UploadStatus::Idle;
                cx.emit(DocumentLoaded { document });
                cx.notify();
            }
            Err(error) => self.fail_ingest(&error, cx),
        }
    }

    fn fail_ingest(&mut self, error: &IngestError, cx: &mut Context<Self>) {
        tracing::warn!(error = %error, kind = ?error.kind(), "ingestion failed");
        self.fail(error.user_message().to_string(), cx);
    }

    fn fail(&mut self, message: String, cx: &mut Context<Self>) {
        self.ingest_task = None;
        self.status = UploadStatus::Failed(message);
        cx.notify();
    }
}

impl Render for UploadView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let busy = self.is_busy();
        let progress = match &self.status {
            UploadStatus::Working(text) => Some(text.clone()),
            UploadStatus::Idle | UploadStatus::Failed(_) => None,
        };
        let error = match &self.status {
            UploadStatus::Failed(text) => Some(text.clone()),
            UploadStatus::Idle | UploadStatus::Working(_) => None,
        };
        let hover_bg = theme.muted;

        v_flex()
            .id("upload-view")
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(
                v_flex()
                    .id("upload-drop-zone")
                    .w(px(520.))
                    .p_8()
                    .gap_4()
                    .items_center()
                    .rounded_lg()
                    .border_2()
                    .border_color(theme.border)
                    .drag_over::<ExternalPaths>(move |style, _, _, _| style.bg(hover_bg))
                    .on_drop(cx.listener(|this, paths: &ExternalPaths, _window, cx| {
                        this.handle_drop(paths, cx);
                    }))
                    .child(
                        div()
                            .text_lg()
                            .font_weight(FontWeight::SEMIBOLD)
                            .text_color(theme.foreground)
                            .child("Chat with your book"),
                    )
                    .child(
                        Label::new("Drop a .txt or .pdf file here, or choose one.")
                            .text_sm()
                            .text_color(theme.muted_foreground),
                    )
                    .child(
                        Button::new("choose-file")
                            .primary()
                            .child("Choose file")
                            .disabled(busy)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.choose_file(cx);
                            })),
                    )
                    .when_some(progress, |zone, text| {
                        zone.child(
                            Label::new(text)
                                .text_sm()
                                .text_color(theme.muted_foreground),
                        )
                    })
                    .when_some(error, |zone, text| {
                        zone.child(Label::new(text).text_sm().text_color(theme.danger))
                    }),
            )
    }
}
