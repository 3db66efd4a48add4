/// File kinds the ingestor understands, keyed by declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    PlainText,
    Pdf,
}

impl DocumentKind {
    pub const PLAIN_TEXT_MEDIA_TYPE: &'static str = "text/plain";
    pub const PDF_MEDIA_TYPE: &'static str = "application/pdf";

    /// Maps a declared media type to a kind.
    ///
    /// Parameters (`; charset=utf-8`) and letter case are ignored.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            Self::PLAIN_TEXT_MEDIA_TYPE => Some(Self::PlainText),
            Self::PDF_MEDIA_TYPE => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::PlainText => Self::PLAIN_TEXT_MEDIA_TYPE,
            Self::Pdf => Self::PDF_MEDIA_TYPE,
        }
    }
}

/// Extracted text of one uploaded file. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    title: String,
    content: String,
    kind: DocumentKind,
    page_count: Option<usize>,
}

impl Document {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        kind: DocumentKind,
        page_count: Option<usize>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            kind,
            page_count,
        }
    }

    /// Source file name.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// Number of pages for PDFs, `None` for plain text.
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }
}
