/*!
 * Tests for document reassembly
 */

use doctrans::document::model::{Block, BlockContent, BoundingBox, PagedDocument};
use doctrans::document::{FitPolicy, LayoutExtractor, Reassembler};
use doctrans::errors::ReassembleError;

use crate::common::{doc_bytes, doc_with_units, page, text_block};

fn echo_translate(layout: &doctrans::document::ExtractedLayout) -> Vec<doctrans::TranslationUnit> {
    layout
        .units
        .iter()
        .map(|u| u.clone().with_translation(u.source_text.clone()))
        .collect()
}

fn block_texts(document: &PagedDocument) -> Vec<String> {
    document
        .pages
        .iter()
        .flat_map(|p| &p.blocks)
        .filter_map(|b| match &b.content {
            BlockContent::Text { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_reassemble_withEchoTranslation_shouldPreserveCountAndPositions() {
    let original = doc_with_units(&[4, 3]);
    let layout = LayoutExtractor::extract(&doc_bytes(&original)).unwrap();
    let translated = echo_translate(&layout);

    let reassembler = Reassembler::new(FitPolicy::default());
    let output = reassembler.reassemble(&layout.document, &translated).unwrap();

    let output_layout = LayoutExtractor::extract(&output.to_bytes().unwrap()).unwrap();
    assert_eq!(output_layout.units.len(), layout.units.len());
    for (before, after) in layout.units.iter().zip(&output_layout.units) {
        assert_eq!(before.ordinal, after.ordinal);
        assert_eq!(before.page_index, after.page_index);
        assert_eq!(before.bbox, after.bbox);
        assert_eq!(before.source_text, after.source_text);
    }
}

#[test]
fn test_reassemble_withMissingUnit_shouldFailUnitCountMismatch() {
    let layout = LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[5]))).unwrap();
    let mut translated = echo_translate(&layout);
    translated.pop();

    let reassembler = Reassembler::new(FitPolicy::default());
    let result = reassembler.reassemble(&layout.document, &translated);

    assert!(matches!(
        result,
        Err(ReassembleError::UnitCountMismatch {
            expected: 5,
            actual: 4
        })
    ));
}

#[test]
fn test_reassemble_withLongerTranslation_shouldShrinkWithinScaleBound() {
    let layout = LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[1]))).unwrap();
    // Grow the text past one line at the original size so fitting has to
    // shrink the font.
    let longer = layout.units[0].source_text.repeat(5);
    let translated = vec![layout.units[0].clone().with_translation(longer.clone())];

    let policy = FitPolicy::default();
    let output = Reassembler::new(policy).reassemble(&layout.document, &translated).unwrap();

    let block = output.pages[0]
        .blocks
        .iter()
        .find(|b| b.is_text())
        .unwrap();
    let BlockContent::Text { text, font_size, .. } = &block.content else {
        panic!("expected text block");
    };
    assert_eq!(*text, longer);
    let original_size = layout.units[0].font_size;
    assert!(*font_size < original_size);
    assert!(*font_size >= original_size * policy.min_font_scale - f32::EPSILON);
}

#[test]
fn test_reassemble_withExtremeTranslation_shouldBoundOverflowAndKeepText() {
    let layout = LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[1]))).unwrap();
    let huge = layout.units[0].source_text.repeat(40);
    let translated = vec![layout.units[0].clone().with_translation(huge.clone())];

    let policy = FitPolicy::default();
    let output = Reassembler::new(policy).reassemble(&layout.document, &translated).unwrap();

    let block = output.pages[0]
        .blocks
        .iter()
        .find(|b| b.is_text())
        .unwrap();
    let BlockContent::Text { text, .. } = &block.content else {
        panic!("expected text block");
    };
    // Text is never dropped, and the box may grow only within the bound.
    assert_eq!(*text, huge);
    let original = layout.units[0].bbox;
    let max_height = original.height() * (1.0 + policy.max_overflow_ratio);
    assert!(block.bbox.height() <= max_height + 0.001);
    assert!(block.overflow.unwrap_or(0.0) <= policy.max_overflow_ratio);
}

#[test]
fn test_reassemble_withNonTextBlocks_shouldCopyThemThroughUnchanged() {
    let image = Block::image(BoundingBox::new(100.0, 200.0, 300.0, 400.0));
    let original = PagedDocument::new(vec![page(
        0,
        vec![text_block("Caption text.", 50.0), image.clone()],
    )]);
    let layout = LayoutExtractor::extract(&doc_bytes(&original)).unwrap();
    let translated = echo_translate(&layout);

    let output = Reassembler::new(FitPolicy::default())
        .reassemble(&layout.document, &translated)
        .unwrap();

    let copied = output.pages[0]
        .blocks
        .iter()
        .find(|b| !b.is_text())
        .unwrap();
    assert_eq!(*copied, image);
}

#[test]
fn test_reassemble_withUntranslatedUnit_shouldFallBackToSourceText() {
    let layout = LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[2]))).unwrap();
    // One unit translated, one left untouched.
    let translated = vec![
        layout.units[0].clone().with_translation("Übersetzt."),
        layout.units[1].clone(),
    ];

    let output = Reassembler::new(FitPolicy::default())
        .reassemble(&layout.document, &translated)
        .unwrap();

    let texts = block_texts(&output);
    assert_eq!(texts[0], "Übersetzt.");
    assert_eq!(texts[1], layout.units[1].source_text);
}

#[test]
fn test_reassemble_withGroupedBlocks_shouldReflowIntoGroupSpan() {
    // Two blocks forming one paragraph; the first gets a translation too
    // long for its own box but fitting the group's vertical span.
    let original = PagedDocument::new(vec![page(
        0,
        vec![
            text_block("A paragraph that keeps going", 50.0),
            text_block("and finally ends here.", 80.0),
        ],
    )]);
    let layout = LayoutExtractor::extract(&doc_bytes(&original)).unwrap();
    assert_eq!(layout.units[0].group_id, layout.units[1].group_id);

    // Long enough that even the minimum font scale cannot fit the text in
    // the block's own box, so placement reflows into the group span.
    let longer = layout.units[0].source_text.repeat(12);
    let translated = vec![
        layout.units[0].clone().with_translation(longer.clone()),
        layout.units[1]
            .clone()
            .with_translation(layout.units[1].source_text.clone()),
    ];

    let output = Reassembler::new(FitPolicy::default())
        .reassemble(&layout.document, &translated)
        .unwrap();

    let texts = block_texts(&output);
    assert_eq!(texts[0], longer);
    assert_eq!(texts[1], layout.units[1].source_text);

    // The reflowed block uses vertical room from the group, not overflow.
    let reflowed = output.pages[0].blocks.iter().find(|b| b.is_text()).unwrap();
    assert!(reflowed.bbox.y1 > layout.units[0].bbox.y1);
    assert!(reflowed.overflow.is_none());
}
