/*!
 * Tests for layout extraction
 */

use doctrans::document::model::{Block, BoundingBox, PagedDocument};
use doctrans::document::LayoutExtractor;
use doctrans::errors::ExtractError;

use crate::common::{doc_bytes, doc_with_units, page, text_block};

#[test]
fn test_extract_withNBlocks_shouldProduceNUnitsWithStrictOrdinals() {
    let document = doc_with_units(&[5, 7, 3]);
    let bytes = doc_bytes(&document);

    let layout = LayoutExtractor::extract(&bytes).unwrap();

    assert_eq!(layout.units.len(), 15);
    for (i, unit) in layout.units.iter().enumerate() {
        assert_eq!(unit.ordinal, i);
    }
}

#[test]
fn test_extract_withShuffledBlocks_shouldFollowReadingOrder() {
    // Page 0 blocks supplied bottom-up and with a left/right tie on one row.
    let blocks = vec![
        text_block("Bottom row.", 300.0),
        Block::text("Right cell.", "Times", 10.0, BoundingBox::new(300.0, 100.0, 450.0, 120.0)),
        Block::text("Left cell.", "Times", 10.0, BoundingBox::new(50.0, 100.0, 200.0, 120.0)),
        text_block("Top row.", 50.0),
    ];
    let document = PagedDocument::new(vec![page(0, blocks)]);

    let layout = LayoutExtractor::extract(&doc_bytes(&document)).unwrap();

    let texts: Vec<&str> = layout.units.iter().map(|u| u.source_text.as_str()).collect();
    assert_eq!(texts, vec!["Top row.", "Left cell.", "Right cell.", "Bottom row."]);
}

#[test]
fn test_extract_withSameBytes_shouldBeDeterministic() {
    let bytes = doc_bytes(&doc_with_units(&[4, 4]));

    let first = LayoutExtractor::extract(&bytes).unwrap();
    let second = LayoutExtractor::extract(&bytes).unwrap();

    assert_eq!(first.units, second.units);
}

#[test]
fn test_extract_withNonTextBlocks_shouldSkipButRecordThem() {
    let blocks = vec![
        text_block("Some text.", 50.0),
        Block::image(BoundingBox::new(50.0, 100.0, 450.0, 300.0)),
        text_block("More text.", 320.0),
    ];
    let document = PagedDocument::new(vec![page(0, blocks)]);

    let layout = LayoutExtractor::extract(&doc_bytes(&document)).unwrap();

    assert_eq!(layout.units.len(), 2);
    assert_eq!(LayoutExtractor::passthrough_count(&layout.document), 1);
}

#[test]
fn test_extract_withWhitespaceOnlyBlock_shouldNotCreateUnit() {
    let blocks = vec![text_block("   \n  ", 50.0), text_block("Real text.", 100.0)];
    let document = PagedDocument::new(vec![page(0, blocks)]);

    let layout = LayoutExtractor::extract(&doc_bytes(&document)).unwrap();

    assert_eq!(layout.units.len(), 1);
    assert_eq!(layout.units[0].source_text, "Real text.");
}

#[test]
fn test_extract_withGarbageBytes_shouldFailUnsupportedFormat() {
    let result = LayoutExtractor::extract(b"not a document at all");
    assert!(matches!(result, Err(ExtractError::UnsupportedFormat(_))));
}

#[test]
fn test_extract_withWrongFormatTag_shouldFailUnsupportedFormat() {
    let mut document = doc_with_units(&[1]);
    document.format = "spreadsheet".to_string();

    let result = LayoutExtractor::extract(&doc_bytes(&document));
    assert!(matches!(result, Err(ExtractError::UnsupportedFormat(_))));
}

#[test]
fn test_extract_withNewerVersion_shouldFailUnsupportedFormat() {
    let mut document = doc_with_units(&[1]);
    document.version = 99;

    let result = LayoutExtractor::extract(&doc_bytes(&document));
    assert!(matches!(result, Err(ExtractError::UnsupportedFormat(_))));
}

#[test]
fn test_extract_withOnlyImages_shouldFailNoTranslatableContent() {
    let blocks = vec![Block::image(BoundingBox::new(0.0, 0.0, 100.0, 100.0))];
    let document = PagedDocument::new(vec![page(0, blocks)]);

    let result = LayoutExtractor::extract(&doc_bytes(&document));
    assert!(matches!(result, Err(ExtractError::NoTranslatableContent)));
}

#[test]
fn test_extract_withUnterminatedBlock_shouldGroupWithNextBlock() {
    let blocks = vec![
        text_block("A sentence that continues", 50.0),
        text_block("and ends here.", 100.0),
        text_block("A standalone sentence.", 150.0),
    ];
    let document = PagedDocument::new(vec![page(0, blocks)]);

    let layout = LayoutExtractor::extract(&doc_bytes(&document)).unwrap();

    assert_eq!(layout.units[0].group_id, layout.units[1].group_id);
    assert_ne!(layout.units[1].group_id, layout.units[2].group_id);
}

#[test]
fn test_extract_withGroupsAcrossPages_shouldNotSpanPages() {
    let document = PagedDocument::new(vec![
        page(0, vec![text_block("Trails off without ending", 50.0)]),
        page(1, vec![text_block("New page text.", 50.0)]),
    ]);

    let layout = LayoutExtractor::extract(&doc_bytes(&document)).unwrap();

    assert_ne!(layout.units[0].group_id, layout.units[1].group_id);
}
