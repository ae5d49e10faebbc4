/*!
 * Layout extraction.
 *
 * Parses raw document bytes into an ordered sequence of translation units
 * with enough geometry and style metadata to re-render the text at a
 * different length. Extraction is a pure transform: the same bytes always
 * yield the same unit sequence.
 */

use log::debug;

use crate::document::model::{
    Block, BlockContent, PagedDocument, TranslationUnit, FORMAT_TAG, FORMAT_VERSION,
};
use crate::errors::ExtractError;

/// Sentence terminators used to detect paragraph boundaries between blocks
const SENTENCE_TERMINATORS: [char; 5] = ['.', ':', ';', '!', '?'];

/// Result of layout extraction: the parsed document plus its unit sequence
#[derive(Debug, Clone)]
pub struct ExtractedLayout {
    /// The parsed source document, kept for reassembly
    pub document: PagedDocument,
    /// Translation units in canonical ordinal order
    pub units: Vec<TranslationUnit>,
}

/// Parses paginated documents into translation units
pub struct LayoutExtractor;

impl LayoutExtractor {
    /// Parse document bytes and derive the canonical unit sequence.
    ///
    /// Reading order is page index ascending, then top-to-bottom, then
    /// left-to-right within a page. Non-text blocks and whitespace-only text
    /// blocks are skipped but stay in the returned document so the
    /// reassembler can composite over them.
    pub fn extract(bytes: &[u8]) -> Result<ExtractedLayout, ExtractError> {
        let document = Self::parse(bytes)?;

        let mut units = Vec::new();
        let mut group_id = 0usize;

        for page in &document.pages {
            let mut page_units = Vec::new();
            for block in &page.blocks {
                if let BlockContent::Text {
                    text,
                    font,
                    font_size,
                } = &block.content
                {
                    if text.trim().is_empty() {
                        continue;
                    }
                    page_units.push(TranslationUnit {
                        ordinal: 0, // assigned after ordering
                        source_text: text.clone(),
                        translated_text: None,
                        bbox: block.bbox,
                        page_index: page.index,
                        font_hint: font.clone(),
                        font_size: *font_size,
                        group_id: 0, // assigned after ordering
                    });
                }
            }

            // Top-to-bottom, then left-to-right. total_cmp keeps the order
            // deterministic even for pathological float coordinates.
            page_units.sort_by(|a, b| {
                a.bbox
                    .y0
                    .total_cmp(&b.bbox.y0)
                    .then(a.bbox.x0.total_cmp(&b.bbox.x0))
            });

            // A block that does not close a sentence continues into the next
            // block on the same page, so both get the same group id.
            let page_unit_count = page_units.len();
            for (i, unit) in page_units.iter_mut().enumerate() {
                unit.group_id = group_id;
                let continues = unit
                    .source_text
                    .trim_end()
                    .chars()
                    .next_back()
                    .map(|c| !SENTENCE_TERMINATORS.contains(&c))
                    .unwrap_or(false);
                if !continues || i == page_unit_count - 1 {
                    group_id += 1;
                }
            }

            units.extend(page_units);
        }

        if units.is_empty() {
            return Err(ExtractError::NoTranslatableContent);
        }

        for (ordinal, unit) in units.iter_mut().enumerate() {
            unit.ordinal = ordinal;
        }

        debug!(
            "extracted {} units across {} pages",
            units.len(),
            document.pages.len()
        );

        Ok(ExtractedLayout { document, units })
    }

    /// Parse and validate the document header
    fn parse(bytes: &[u8]) -> Result<PagedDocument, ExtractError> {
        let document: PagedDocument = serde_json::from_slice(bytes)
            .map_err(|e| ExtractError::UnsupportedFormat(e.to_string()))?;

        if document.format != FORMAT_TAG {
            return Err(ExtractError::UnsupportedFormat(format!(
                "unknown format tag '{}'",
                document.format
            )));
        }
        if document.version > FORMAT_VERSION {
            return Err(ExtractError::UnsupportedFormat(format!(
                "format version {} is newer than supported version {}",
                document.version, FORMAT_VERSION
            )));
        }

        Ok(document)
    }

    /// Count the non-text blocks recorded for passthrough
    pub fn passthrough_count(document: &PagedDocument) -> usize {
        document
            .pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter(|b| !matches!(b.content, BlockContent::Text { .. }))
            .count()
    }
}

/// Convenience check used by callers that only need to know whether a block
/// would become a unit
pub fn is_translatable(block: &Block) -> bool {
    match &block.content {
        BlockContent::Text { text, .. } => !text.trim().is_empty(),
        _ => false,
    }
}
