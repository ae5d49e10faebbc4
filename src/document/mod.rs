/*!
 * Paginated document handling.
 *
 * - `model`: document and translation unit data structures
 * - `extractor`: document bytes to ordered translation units
 * - `reassembler`: translated units back to a positioned document
 */

pub mod extractor;
pub mod model;
pub mod reassembler;

pub use extractor::{ExtractedLayout, LayoutExtractor};
pub use model::{Block, BlockContent, BoundingBox, Page, PagedDocument, TranslationUnit};
pub use reassembler::{FitPolicy, Reassembler};
