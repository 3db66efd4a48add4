use hayro_interpret::font::Glyph;
use hayro_interpret::{
    BlendMode, ClipPath, Device, GlyphDrawMode, Image, Paint, PathDrawMode, SoftMask,
};
use kurbo::{Affine, Rect, Shape};

/// A single glyph event, optionally mapped to a Unicode character.
#[derive(Debug, Clone)]
pub struct ExtractedGlyph {
    /// Best-effort Unicode mapping for the glyph.
    pub ch: Option<char>,
    /// Bounding box in *page space* (after applying transforms), if it can be determined.
    ///
    /// Type3 glyphs and glyphs with an empty outline (spaces) have no usable bbox.
    pub bbox: Option<Rect>,
}

/// A `hayro-interpret` [`Device`] that records glyph events for one page.
///
/// Typical usage:
/// - Run `hayro_interpret::interpret_page(...)` with this device.
/// - Call [`TextExtractDevice::page_text`] to get the page as a single line of runs.
#[derive(Debug, Default)]
pub struct TextExtractDevice {
    /// Glyph events in the order they are emitted by the interpreter.
    pub glyphs: Vec<ExtractedGlyph>,
}

/// Geometry thresholds used to split glyphs into runs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Minimum vertical overlap ratio (relative to the smaller glyph bbox height)
    /// to consider two glyphs on the same line.
    pub same_line_overlap_ratio: f64,
    /// A horizontal gap larger than this ratio times the average bbox height ends the run.
    ///
    /// Height stands in for font size because PDFs often omit explicit space characters
    /// and rely on positioning instead.
    pub gap_to_height_ratio: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            same_line_overlap_ratio: 0.5,
            // Gap greater than ~1/4 of the font size reads as a word break.
            gap_to_height_ratio: 0.25,
        }
    }
}

impl TextExtractDevice {
    /// Groups the captured glyphs into trimmed, non-empty text runs.
    pub fn text_runs(&self) -> Vec<String> {
        self.text_runs_with(&RunOptions::default())
    }

    /// Same as [`TextExtractDevice::text_runs`] but configurable.
    pub fn text_runs_with(&self, opts: &RunOptions) -> Vec<String> {
        let mut runs = Vec::new();
        let mut current = String::new();
        let mut last_bbox: Option<Rect> = None;

        for glyph in &self.glyphs {
            let bbox = glyph.bbox.filter(|bbox| bbox.height() > 0.0);

            if let (Some(prev), Some(cur)) = (last_bbox, bbox)
                && breaks_run(prev, cur, opts)
            {
                push_run(&mut runs, &mut current);
            }

            if let Some(ch) = glyph.ch {
                current.push(ch);
            }

            if bbox.is_some() {
                last_bbox = bbox;
            }
        }

        push_run(&mut runs, &mut current);
        runs
    }

    /// Text runs of the page joined with a single space.
    pub fn page_text(&self) -> String {
        self.text_runs().join(" ")
    }
}

fn push_run(runs: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        runs.push(trimmed.to_string());
    }
    current.clear();
}

fn breaks_run(prev: Rect, cur: Rect, opts: &RunOptions) -> bool {
    if !is_same_line(prev, cur, opts.same_line_overlap_ratio) {
        return true;
    }

    let gap = cur.x0 - prev.x1;
    // Negative/zero gaps happen due to kerning or overlap.
    if gap <= 0.0 {
        return false;
    }

    let avg_h = 0.5 * (prev.height() + cur.height());
    gap > opts.gap_to_height_ratio * avg_h
}

fn is_same_line(a: Rect, b: Rect, min_overlap_ratio: f64) -> bool {
    let overlap = a.y1.min(b.y1) - a.y0.max(b.y0);
    if overlap <= 0.0 {
        return false;
    }

    let denom = a.height().min(b.height());
    if denom <= 0.0 {
        return false;
    }

    (overlap / denom) >= min_overlap_ratio
}

impl<'a> Device<'a> for TextExtractDevice {
    fn set_soft_mask(&mut self, _mask: Option<SoftMask<'a>>) {}

    fn set_blend_mode(&mut self, _blend_mode: BlendMode) {}

    fn draw_path(
        &mut self,
        _path: &kurbo::BezPath,
        _transform: Affine,
        _paint: &Paint<'a>,
        _draw_mode: &PathDrawMode,
    ) {
    }

    fn push_clip_path(&mut self, _clip_path: &ClipPath) {
        // Clipping never hides text from extraction.
    }

    fn push_transparency_group(
        &mut self,
        _opacity: f32,
        _mask: Option<SoftMask<'a>>,
        _blend_mode: BlendMode,
    ) {
    }

    fn draw_glyph(
        &mut self,
        glyph: &Glyph<'a>,
        transform: Affine,
        glyph_transform: Affine,
        _paint: &Paint<'a>,
        _draw_mode: &GlyphDrawMode,
    ) {
        // Outline bboxes are computed in page space so rotated text still groups by line.
        let bbox = match glyph {
            Glyph::Outline(og) => {
                let path_in_page = transform * (glyph_transform * og.outline());
                Some(path_in_page.bounding_box())
            }
            Glyph::Type3(_) => None,
        };

        self.glyphs.push(ExtractedGlyph {
            ch: glyph.as_unicode(),
            bbox,
        });
    }

    fn draw_image(&mut self, _image: Image<'a, '_>, _transform: Affine) {}

    fn pop_clip_path(&mut self) {}

    fn pop_transparency_group(&mut self) {}
}
