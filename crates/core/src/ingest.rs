use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use snafu::ResultExt;
use tokio::sync::mpsc;

use crate::document::{Document, DocumentKind};
use crate::error::{DecodeTextSnafu, IngestError, IngestResult, ReadFileSnafu};

/// A user-selected file with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, declaring its media type from the extension.
    ///
    /// Unsupported types are rejected before any bytes are read.
    pub async fn load(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut file = Self::new(name, media_type_for_path(path), Vec::new());
        file.kind()?;

        file.bytes = tokio::fs::read(path).await.context(ReadFileSnafu {
            stage: "read-source-file",
            path: path.to_path_buf(),
        })?;
        Ok(file)
    }

    /// Resolves the declared media type, failing for anything but text and PDF.
    pub fn kind(&self) -> IngestResult<DocumentKind> {
        DocumentKind::from_media_type(&self.media_type).ok_or_else(|| {
            IngestError::UnsupportedFileType {
                stage: "resolve-document-kind",
                name: self.name.clone(),
                media_type: self.media_type.clone(),
            }
        })
    }
}

/// Declared media type for a path, the way a file picker reports it.
pub fn media_type_for_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Progress notifications for UI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress {
    ReadingText,
    ParsingPdf,
    /// Emitted before page `current` (1-based) of `total` is extracted.
    Page { current: usize, total: usize },
}

impl IngestProgress {
    /// First status to show for `path`, before its bytes are read.
    pub fn opening(path: &Path) -> Self {
        match DocumentKind::from_media_type(&media_type_for_path(path)) {
            Some(DocumentKind::Pdf) => Self::ParsingPdf,
            Some(DocumentKind::PlainText) | None => Self::ReadingText,
        }
    }
}

impl fmt::Display for IngestProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadingText => write!(f, "Reading your book..."),
            Self::ParsingPdf => write!(f, "Parsing PDF..."),
            Self::Page { current, total } => write!(f, "Reading page {current} of {total}..."),
        }
    }
}

/// Converts a file into a [`Document`]. No partial document is returned on failure.
pub fn ingest(
    file: SourceFile,
    mut on_progress: impl FnMut(IngestProgress),
) -> IngestResult<Document> {
    let kind = file.kind()?;
    let SourceFile { name, bytes, .. } = file;

    tracing::debug!(name = %name, kind = ?kind, byte_count = bytes.len(), "ingesting document");

    let document = match kind {
        DocumentKind::PlainText => {
            on_progress(IngestProgress::ReadingText);
            let content = String::from_utf8(bytes).context(DecodeTextSnafu {
                stage: "decode-plain-text",
                name: name.clone(),
            })?;
            Document::new(name, content, kind, None)
        }
        DocumentKind::Pdf => {
            on_progress(IngestProgress::ParsingPdf);
            let pages = extract_pdf_pages(&name, bytes, &mut on_progress)?;
            let page_count = pages.len();
            Document::new(name, pages.join("\n\n"), kind, Some(page_count))
        }
    };

    tracing::info!(
        title = %document.title(),
        kind = ?document.kind(),
        page_count = ?document.page_count(),
        char_count = document.content().chars().count(),
        "document ingested"
    );

    Ok(document)
}

#[cfg(feature = "pdf")]
fn extract_pdf_pages(
    name: &str,
    bytes: Vec<u8>,
    on_progress: &mut impl FnMut(IngestProgress),
) -> IngestResult<Vec<String>> {
    let parse_error = |stage: &'static str, error: biblio_pdf::PdfError| IngestError::Parse {
        stage,
        name: name.to_string(),
        details: error.to_string(),
    };

    let pdf = biblio_pdf::PdfText::open(bytes).map_err(|error| parse_error("open-pdf", error))?;
    pdf.pages_text(|current, total| on_progress(IngestProgress::Page { current, total }))
        .map_err(|error| parse_error("extract-pdf-pages", error))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf_pages(
    name: &str,
    _bytes: Vec<u8>,
    _on_progress: &mut impl FnMut(IngestProgress),
) -> IngestResult<Vec<String>> {
    tracing::warn!(name = %name, "PDF ingestion requested but the pdf feature is disabled");
    crate::error::DependencyUnavailableSnafu {
        stage: "extract-pdf-pages",
        capability: "PDF parsing",
    }
    .fail()
}

pub type IngestWorker = Pin<Box<dyn Future<Output = IngestResult<Document>> + Send + 'static>>;

/// A running ingestion: progress events plus the worker that produces the document.
///
/// The worker must be polled on a Tokio runtime; it moves extraction onto the blocking pool.
pub struct IngestHandle {
    pub progress: mpsc::UnboundedReceiver<IngestProgress>,
    pub worker: IngestWorker,
}

pub fn spawn_ingest(file: SourceFile) -> IngestHandle {
    let (progress_tx, progress) = mpsc::unbounded_channel();
    let name = file.name.clone();

    let worker: IngestWorker = Box::pin(async move {
        let joined = tokio::task::spawn_blocking(move || {
            ingest(file, |event| {
                let _ = progress_tx.send(event);
            })
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(name = %name, error = %error, "ingestion worker failed");
                Err(IngestError::Worker {
                    stage: "join-ingest-worker",
                    name,
                    details: error.to_string(),
                })
            }
        }
    });

    IngestHandle { progress, worker }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestErrorKind;

    /// Builds an uncompressed PDF with one Helvetica text line per page.
    fn build_pdf(pages: &[&str]) -> Vec<u8> {
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            String::new(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut kids = Vec::new();
        for text in pages {
            let page_number = objects.len() + 1;
            let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_number + 1
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ));
            kids.push(format!("{page_number} 0 R"));
        }
        objects[1] = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        );

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
        }

        let xref_offset = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn plain_text_is_returned_verbatim() {
        let raw = "Title\r\n\n  indented line\twith tab \n\u{00e9}t\u{00e9} \u{1f4d6}\n\n\n";
        let file = SourceFile::new("notes.txt", "text/plain", raw.as_bytes().to_vec());

        let mut progress = Vec::new();
        let document = ingest(file, |event| progress.push(event)).unwrap();

        assert_eq!(document.content(), raw);
        assert_eq!(document.title(), "notes.txt");
        assert_eq!(document.kind(), DocumentKind::PlainText);
        assert_eq!(document.page_count(), None);
        assert_eq!(progress, vec![IngestProgress::ReadingText]);
    }

    #[test]
    fn unsupported_media_types_are_rejected_before_decoding() {
        let file = SourceFile::new("cover.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
        let mut progress = Vec::new();

        let error = ingest(file, |event| progress.push(event)).unwrap_err();

        assert_eq!(error.kind(), IngestErrorKind::UnsupportedFileType);
        assert_eq!(error.user_message(), "Please upload a valid .txt or .pdf file.");
        assert!(progress.is_empty());
    }

    #[test]
    fn invalid_utf8_is_a_read_error() {
        let file = SourceFile::new("broken.txt", "text/plain", vec![b'o', b'k', 0xff, 0xfe]);
        let error = ingest(file, |_| {}).unwrap_err();
        assert_eq!(error.kind(), IngestErrorKind::ReadError);
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn pdf_pages_are_joined_with_blank_lines_in_order() {
        let bytes = build_pdf(&["First page", "Second page", "Third page"]);
        let file = SourceFile::new("trilogy.pdf", "application/pdf", bytes);

        let mut progress = Vec::new();
        let document = ingest(file, |event| progress.push(event)).unwrap();

        assert_eq!(document.kind(), DocumentKind::Pdf);
        assert_eq!(document.page_count(), Some(3));
        assert_eq!(
            document.content(),
            "First page\n\nSecond page\n\nThird page"
        );
        assert_eq!(
            progress,
            vec![
                IngestProgress::ParsingPdf,
                IngestProgress::Page { current: 1, total: 3 },
                IngestProgress::Page { current: 2, total: 3 },
                IngestProgress::Page { current: 3, total: 3 },
            ]
        );
        assert_eq!(progress[2].to_string(), "Reading page 2 of 3...");
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn single_page_pdf_has_no_separator() {
        let file = SourceFile::new("leaflet.pdf", "application/pdf", build_pdf(&["Only page"]));
        let document = ingest(file, |_| {}).unwrap();

        assert_eq!(document.content(), "Only page");
        assert_eq!(document.page_count(), Some(1));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn empty_pages_still_produce_a_block() {
        let bytes = build_pdf(&["Opening", "", "Closing"]);
        let file = SourceFile::new("gap.pdf", "application/pdf", bytes);
        let document = ingest(file, |_| {}).unwrap();

        assert_eq!(document.content(), "Opening\n\n\n\nClosing");
        assert_eq!(
            document.content().split("\n\n").collect::<Vec<_>>(),
            vec!["Opening", "", "Closing"]
        );
        assert_eq!(document.page_count(), Some(3));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn corrupted_pdf_is_a_parse_error() {
        let file = SourceFile::new(
            "torn.pdf",
            "application/pdf",
            b"this was never a pdf".to_vec(),
        );
        let error = ingest(file, |_| {}).unwrap_err();
        assert_eq!(error.kind(), IngestErrorKind::ParseError);
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_without_parser_reports_dependency_unavailable() {
        let file = SourceFile::new("book.pdf", "application/pdf", build_pdf(&["x"]));
        let error = ingest(file, |_| {}).unwrap_err();
        assert_eq!(error.kind(), IngestErrorKind::DependencyUnavailable);
    }

    #[tokio::test]
    async fn load_declares_media_type_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moby-dick.txt");
        std::fs::write(&path, "Call me Ishmael.").unwrap();

        let file = SourceFile::load(&path).await.unwrap();

        assert_eq!(file.name, "moby-dick.txt");
        assert_eq!(file.media_type, "text/plain");
        assert_eq!(file.kind().unwrap(), DocumentKind::PlainText);
    }

    #[tokio::test]
    async fn unsupported_files_are_rejected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        // Never created: a read attempt would surface as a read error instead.
        let error = SourceFile::load(dir.path().join("cover.png"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), IngestErrorKind::UnsupportedFileType);
        assert_eq!(error.user_message(), "Please upload a valid .txt or .pdf file.");
    }

    #[test]
    fn opening_status_follows_the_extension() {
        assert_eq!(
            IngestProgress::opening(Path::new("/books/atlas.pdf")),
            IngestProgress::ParsingPdf
        );
        assert_eq!(
            IngestProgress::opening(Path::new("/books/atlas.txt")),
            IngestProgress::ReadingText
        );
        assert_eq!(
            IngestProgress::opening(Path::new("atlas.pdf")).to_string(),
            "Parsing PDF..."
        );
    }

    #[tokio::test]
    async fn missing_files_are_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let error = SourceFile::load(dir.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), IngestErrorKind::ReadError);
    }

    #[tokio::test]
    async fn spawned_ingest_streams_progress_then_returns_the_document() {
        let file = SourceFile::new("short.txt", "text/plain", b"brief".to_vec());
        let IngestHandle {
            mut progress,
            worker,
        } = spawn_ingest(file);

        let document = worker.await.unwrap();
        assert_eq!(document.content(), "brief");
        assert_eq!(progress.recv().await, Some(IngestProgress::ReadingText));
        assert_eq!(progress.recv().await, None);
    }
}
