//! PDF text extraction for document ingestion.
//!
//! This crate provides:
//! - Glyph capture via [`TextExtractDevice`]
//! - Grouping of glyphs into text runs (one run per contiguous word group on a line)
//! - Per-page extraction over a whole document via [`PdfText`]
//!
//! Notes:
//! - PDF text is not guaranteed to have a reliable Unicode mapping. `Glyph::as_unicode()` is
//!   best-effort, so glyphs without a mapping are dropped from the extracted text.
//! - Runs are derived from glyph geometry, not from content-stream operators, which keeps
//!   extraction stable for PDFs that position every glyph individually.

mod device;
mod extract;

pub use device::{ExtractedGlyph, RunOptions, TextExtractDevice};
pub use extract::{PdfError, PdfResult, PdfText};
