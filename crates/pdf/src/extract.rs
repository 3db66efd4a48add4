use std::sync::Arc;

use hayro_interpret::hayro_syntax::Pdf;
use hayro_interpret::util::PageExt;
use hayro_interpret::{Context, InterpreterSettings, interpret_page};
use kurbo::Rect;
use snafu::{OptionExt, Snafu};

use crate::device::{RunOptions, TextExtractDevice};

pub type PdfResult<T> = Result<T, PdfError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PdfError {
    #[snafu(display("failed to load PDF on `{stage}`: {details}"))]
    Load {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("page {index} is out of range for a document with {page_count} pages"))]
    PageOutOfRange {
        stage: &'static str,
        index: usize,
        page_count: usize,
    },
}

/// A parsed PDF ready for page-by-page text extraction.
pub struct PdfText {
    pdf: Pdf,
    settings: InterpreterSettings,
    run_options: RunOptions,
}

impl PdfText {
    /// Parses the document. Corrupted and password-protected files fail here.
    pub fn open(bytes: Vec<u8>) -> PdfResult<Self> {
        let pdf = Pdf::new(Arc::new(bytes)).map_err(|error| PdfError::Load {
            stage: "open-pdf",
            details: format!("{error:?}"),
        })?;

        Ok(Self {
            pdf,
            settings: InterpreterSettings::default(),
            run_options: RunOptions::default(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.pdf.pages().len()
    }

    /// Extracts the text of the page at zero-based `index`, runs joined with single spaces.
    pub fn page_text(&self, index: usize) -> PdfResult<String> {
        let page_count = self.page_count();
        let pages = self.pdf.pages();
        let page = pages.get(index).context(PageOutOfRangeSnafu {
            stage: "select-page",
            index,
            page_count,
        })?;

        let (w, h) = page.render_dimensions();
        let bbox = Rect::new(0.0, 0.0, w as f64, h as f64);
        let mut ctx = Context::new(
            page.initial_transform(true),
            bbox,
            page.xref(),
            self.settings.clone(),
        );
        let mut device = TextExtractDevice::default();

        interpret_page(page, &mut ctx, &mut device);

        let runs = device.text_runs_with(&self.run_options);
        tracing::trace!(
            page = index + 1,
            glyph_count = device.glyphs.len(),
            run_count = runs.len(),
            "extracted page text"
        );
        Ok(runs.join(" "))
    }

    /// Extracts every page in order.
    ///
    /// `on_page(current, total)` runs before page `current` (1-based) is interpreted.
    pub fn pages_text(&self, mut on_page: impl FnMut(usize, usize)) -> PdfResult<Vec<String>> {
        let total = self.page_count();
        let mut pages = Vec::with_capacity(total);

        for index in 0..total {
            on_page(index + 1, total);
            pages.push(self.page_text(index)?);
        }

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_to_load() {
        let result = PdfText::open(b"definitely not a pdf".to_vec());
        assert!(matches!(result, Err(PdfError::Load { .. })));
    }
}
