/*!
 * Document data model.
 *
 * These structures describe a paginated document as an ordered set of
 * positioned blocks, plus the translation units derived from it. The same
 * model is used on both sides of the pipeline: the extractor produces units
 * from a `PagedDocument`, and the reassembler writes translated text back
 * into a new `PagedDocument`.
 */

use serde::{Deserialize, Serialize};

/// Format tag expected in the document header
pub const FORMAT_TAG: &str = "paged-doc";

/// Highest document format version this crate understands
pub const FORMAT_VERSION: u32 = 1;

/// Axis-aligned rectangle in page coordinates (origin top-left, y grows down)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x0: f32,
    /// Top edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Bottom edge
    pub y1: f32,
}

impl BoundingBox {
    /// Create a bounding box from its four edges
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Width of the box
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    /// Height of the box
    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }
}

/// Content of a single layout block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockContent {
    /// A run of text with a uniform dominant font
    Text {
        /// Text content of the block
        text: String,
        /// Dominant font name
        font: String,
        /// Dominant font size in points
        font_size: f32,
    },
    /// A raster image; carried through reassembly untouched
    Image,
    /// Vector art; carried through reassembly untouched
    Drawing,
}

/// One positioned block on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block content
    #[serde(flatten)]
    pub content: BlockContent,
    /// Position of the block on the page
    pub bbox: BoundingBox,
    /// How far past the original box bottom the placed text extends,
    /// as a fraction of the box height. Only set by the reassembler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<f32>,
}

impl Block {
    /// Create a text block
    pub fn text(
        text: impl Into<String>,
        font: impl Into<String>,
        font_size: f32,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            content: BlockContent::Text {
                text: text.into(),
                font: font.into(),
                font_size,
            },
            bbox,
            overflow: None,
        }
    }

    /// Create a passthrough image block
    pub fn image(bbox: BoundingBox) -> Self {
        Self {
            content: BlockContent::Image,
            bbox,
            overflow: None,
        }
    }

    /// Whether this block carries translatable text
    pub fn is_text(&self) -> bool {
        matches!(self.content, BlockContent::Text { .. })
    }
}

/// One page of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    /// Page width in points
    pub width: f32,
    /// Page height in points
    pub height: f32,
    /// Blocks on the page, in source order
    pub blocks: Vec<Block>,
}

/// A parsed paginated document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedDocument {
    /// Format tag, always [`FORMAT_TAG`]
    pub format: String,
    /// Format version
    pub version: u32,
    /// Pages in reading order
    pub pages: Vec<Page>,
}

impl PagedDocument {
    /// Create an empty document with the current format header
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            pages,
        }
    }

    /// Serialize the document to bytes
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Smallest fragment of text translated and repositioned independently.
///
/// Ordinal order is the sole canonical order for both dispatch and
/// reassembly. Units are immutable after extraction except for attaching
/// the translated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Stable zero-based ordinal within the job
    pub ordinal: usize,
    /// Original text
    pub source_text: String,
    /// Translated text, attached after dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    /// Original position of the text block
    pub bbox: BoundingBox,
    /// Page the unit came from
    pub page_index: usize,
    /// Dominant font of the source block
    pub font_hint: String,
    /// Dominant font size of the source block
    pub font_size: f32,
    /// Units sharing a group id belong to one logical paragraph and are
    /// kept contiguous through batching and reassembly
    pub group_id: usize,
}

impl TranslationUnit {
    /// Character cost of this unit for batch sizing
    pub fn cost(&self) -> usize {
        self.source_text.chars().count()
    }

    /// Attach translated text, consuming the unit
    pub fn with_translation(mut self, text: impl Into<String>) -> Self {
        self.translated_text = Some(text.into());
        self
    }
}
