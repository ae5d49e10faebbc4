/*!
 * Document reassembly.
 *
 * Merges translated units back into a new document, placing each unit's text
 * inside its original bounding box. Translated text is usually longer than
 * the source, so placement walks a fitting ladder: keep the original font
 * size, shrink within a bounded scale, reflow into the group's vertical
 * space, then allow bounded overflow past the box edge. Text is never
 * dropped.
 */

use std::collections::HashMap;

use log::{debug, warn};

use crate::document::extractor::is_translatable;
use crate::document::model::{Block, BoundingBox, PagedDocument, TranslationUnit};
use crate::errors::ReassembleError;

/// Hard floor for font size when every other fitting step is exhausted
const MIN_ABSOLUTE_FONT_SIZE: f32 = 1.0;

/// Step used when walking font sizes down
const FONT_SHRINK_STEP: f32 = 0.1;

/// Tunable fitting behavior.
///
/// The overflow bound is a policy choice, not an invariant of the source
/// material; callers configure it and tests assert only that overflow stays
/// within the configured bound.
#[derive(Debug, Clone, Copy)]
pub struct FitPolicy {
    /// Lowest font scale relative to the original size before reflow kicks in
    pub min_font_scale: f32,
    /// Line height as a multiple of font size
    pub line_height_factor: f32,
    /// Average glyph advance as a multiple of font size
    pub char_width_factor: f32,
    /// Maximum growth of the box bottom edge, as a fraction of box height
    pub max_overflow_ratio: f32,
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self {
            min_font_scale: 0.6,
            line_height_factor: 1.3,
            char_width_factor: 0.5,
            max_overflow_ratio: 0.5,
        }
    }
}

/// Outcome of placing one unit
#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    /// Fit at the given size inside the original box
    Fitted { font_size: f32 },
    /// Fit at the given size using the group's vertical span
    Reflowed { font_size: f32, height: f32 },
    /// Placed with the box bottom grown by `overflow` of the box height
    Overflowed { font_size: f32, overflow: f32 },
}

/// Merges translated units into a new document
pub struct Reassembler {
    policy: FitPolicy,
}

impl Reassembler {
    /// Create a reassembler with the given fitting policy
    pub fn new(policy: FitPolicy) -> Self {
        Self { policy }
    }

    /// Rebuild the document with translated text at the original positions.
    ///
    /// `units` must be the full ordinal-ordered unit sequence for the
    /// document. A count mismatch is an upstream contract violation and
    /// fails the job without retry.
    pub fn reassemble(
        &self,
        original: &PagedDocument,
        units: &[TranslationUnit],
    ) -> Result<PagedDocument, ReassembleError> {
        let expected = original
            .pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter(|b| is_translatable(b))
            .count();
        if units.len() != expected {
            return Err(ReassembleError::UnitCountMismatch {
                expected,
                actual: units.len(),
            });
        }

        // The vertical span of each group on each page, for the reflow step.
        let mut group_bottom: HashMap<(usize, usize), f32> = HashMap::new();
        let mut group_size: HashMap<usize, usize> = HashMap::new();
        for unit in units {
            let key = (unit.page_index, unit.group_id);
            let bottom = group_bottom.entry(key).or_insert(unit.bbox.y1);
            *bottom = bottom.max(unit.bbox.y1);
            *group_size.entry(unit.group_id).or_insert(0) += 1;
        }

        let mut remaining = units.iter();
        let mut pages = Vec::with_capacity(original.pages.len());

        for page in &original.pages {
            // Pair blocks with units in the extractor's reading order.
            let mut slots: Vec<usize> = page
                .blocks
                .iter()
                .enumerate()
                .filter(|(_, b)| is_translatable(b))
                .map(|(i, _)| i)
                .collect();
            slots.sort_by(|&a, &b| {
                let (ba, bb) = (&page.blocks[a].bbox, &page.blocks[b].bbox);
                ba.y0.total_cmp(&bb.y0).then(ba.x0.total_cmp(&bb.x0))
            });

            let mut replacements: HashMap<usize, Block> = HashMap::new();
            for slot in slots {
                let unit = remaining
                    .next()
                    .expect("unit count verified against block count");
                let in_group = group_size.get(&unit.group_id).copied().unwrap_or(1) > 1;
                let span_bottom = group_bottom
                    .get(&(unit.page_index, unit.group_id))
                    .copied()
                    .unwrap_or(unit.bbox.y1);
                replacements.insert(slot, self.place_unit(unit, in_group, span_bottom));
            }

            let blocks = page
                .blocks
                .iter()
                .enumerate()
                .map(|(i, block)| replacements.remove(&i).unwrap_or_else(|| block.clone()))
                .collect();

            pages.push(crate::document::model::Page {
                index: page.index,
                width: page.width,
                height: page.height,
                blocks,
            });
        }

        debug!("reassembled {} units into {} pages", units.len(), pages.len());

        Ok(PagedDocument::new(pages))
    }

    /// Walk the fitting ladder for one unit and produce its output block
    fn place_unit(&self, unit: &TranslationUnit, in_group: bool, span_bottom: f32) -> Block {
        let text = match &unit.translated_text {
            Some(t) => t.clone(),
            None => {
                warn!(
                    "unit {} has no translation, keeping source text",
                    unit.ordinal
                );
                unit.source_text.clone()
            }
        };

        let placement = self.fit(&text, unit, in_group, span_bottom);

        let (font_size, bbox, overflow) = match placement {
            Placement::Fitted { font_size } => (font_size, unit.bbox, None),
            Placement::Reflowed { font_size, height } => {
                let mut bbox = unit.bbox;
                bbox.y1 = unit.bbox.y0 + height;
                (font_size, bbox, None)
            }
            Placement::Overflowed { font_size, overflow } => {
                let mut bbox = unit.bbox;
                bbox.y1 = unit.bbox.y0 + unit.bbox.height() * (1.0 + overflow);
                (font_size, bbox, Some(overflow))
            }
        };

        let mut block = Block::text(text, unit.font_hint.clone(), font_size, bbox);
        block.overflow = overflow;
        block
    }

    /// Decide where the text lands on the fitting ladder
    fn fit(
        &self,
        text: &str,
        unit: &TranslationUnit,
        in_group: bool,
        span_bottom: f32,
    ) -> Placement {
        let box_width = unit.bbox.width();
        let box_height = unit.bbox.height();
        let min_size = (unit.font_size * self.policy.min_font_scale).max(MIN_ABSOLUTE_FONT_SIZE);

        // 1. Original size, original box.
        if self.height_needed(text, unit.font_size, box_width) <= box_height {
            return Placement::Fitted {
                font_size: unit.font_size,
            };
        }

        // 2. Shrink within the bounded scale.
        let mut size = unit.font_size - FONT_SHRINK_STEP;
        while size >= min_size {
            if self.height_needed(text, size, box_width) <= box_height {
                return Placement::Fitted { font_size: size };
            }
            size -= FONT_SHRINK_STEP;
        }

        // 3. Reflow into the group's vertical span.
        if in_group && span_bottom > unit.bbox.y1 {
            let span_height = span_bottom - unit.bbox.y0;
            let needed = self.height_needed(text, min_size, box_width);
            if needed <= span_height {
                return Placement::Reflowed {
                    font_size: min_size,
                    height: needed,
                };
            }
        }

        // 4. Bounded overflow past the box edge, never truncation. If even
        // the allowed overflow cannot hold the text at the minimum scale,
        // keep shrinking below the scale floor so the full text still lands
        // inside the bound.
        let allowed_height = box_height * (1.0 + self.policy.max_overflow_ratio);
        let mut size = min_size;
        loop {
            let needed = self.height_needed(text, size, box_width);
            if needed <= allowed_height || size <= MIN_ABSOLUTE_FONT_SIZE {
                if size < min_size {
                    warn!(
                        "unit {} shrunk below scale floor to {:.1}pt to respect overflow bound",
                        unit.ordinal, size
                    );
                }
                let overflow = ((needed - box_height) / box_height)
                    .clamp(0.0, self.policy.max_overflow_ratio);
                return Placement::Overflowed {
                    font_size: size,
                    overflow,
                };
            }
            size = (size - FONT_SHRINK_STEP).max(MIN_ABSOLUTE_FONT_SIZE);
        }
    }

    /// Vertical space the text needs at the given size and column width
    fn height_needed(&self, text: &str, font_size: f32, box_width: f32) -> f32 {
        let chars_per_line =
            ((box_width / (font_size * self.policy.char_width_factor)).floor() as usize).max(1);
        let lines: usize = text
            .split('\n')
            .map(|line| line.chars().count().div_ceil(chars_per_line).max(1))
            .sum();
        lines as f32 * font_size * self.policy.line_height_factor
    }
}


/// Convenience used by tests and callers to read back a block's bbox
pub fn placed_bbox(block: &Block) -> BoundingBox {
    block.bbox
}
