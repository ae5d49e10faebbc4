/*!
 * Tests for unit batching
 */

use doctrans::document::LayoutExtractor;
use doctrans::document::model::TranslationUnit;
use doctrans::document::model::BoundingBox;
use doctrans::translation::{BatchLimits, UnitBatcher};

use crate::common::{doc_bytes, doc_with_units};

/// Build a bare unit for batcher-only tests
fn unit(ordinal: usize, group_id: usize, text: &str) -> TranslationUnit {
    TranslationUnit {
        ordinal,
        source_text: text.to_string(),
        translated_text: None,
        bbox: BoundingBox::new(0.0, 0.0, 100.0, 20.0),
        page_index: 0,
        font_hint: "Times".to_string(),
        font_size: 10.0,
        group_id,
    }
}

#[test]
fn test_partition_with40UnitsCapacity15_shouldProduceThreeBatches() {
    let layout =
        LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[14, 13, 13]))).unwrap();
    assert_eq!(layout.units.len(), 40);

    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 15,
        max_chars: 100_000,
    });
    let batches = batcher.partition(&layout.units);

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![15, 15, 10]);
}

#[test]
fn test_partition_withAnySequence_shouldPreserveOrderAndCoverEveryUnit() {
    let layout = LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[9, 8]))).unwrap();
    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 4,
        max_chars: 100_000,
    });

    let batches = batcher.partition(&layout.units);

    let flattened: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.units.iter().map(|u| u.ordinal))
        .collect();
    let expected: Vec<usize> = (0..layout.units.len()).collect();
    assert_eq!(flattened, expected);
    for batch in &batches {
        assert!(batch.len() <= 4);
    }
}

#[test]
fn test_partition_withCharLimit_shouldKeepBatchCostUnderCeiling() {
    let units: Vec<TranslationUnit> = (0..10)
        .map(|i| unit(i, i, "ten chars!"))
        .collect();
    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 100,
        max_chars: 25,
    });

    let batches = batcher.partition(&units);

    for batch in &batches {
        assert!(batch.cost() <= 25, "batch cost {} over ceiling", batch.cost());
    }
    assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 10);
}

#[test]
fn test_partition_withFittingGroup_shouldNotSplitGroupAcrossBatches() {
    // Units 2-4 form one group; a capacity of 4 forces a flush before the
    // group rather than a split through it.
    let units = vec![
        unit(0, 0, "First sentence."),
        unit(1, 1, "Second sentence."),
        unit(2, 2, "Group part one"),
        unit(3, 2, "group part two"),
        unit(4, 2, "group part three."),
        unit(5, 3, "Last sentence."),
    ];
    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 4,
        max_chars: 100_000,
    });

    let batches = batcher.partition(&units);

    for batch in &batches {
        let group_ordinals: Vec<usize> = batch
            .units
            .iter()
            .filter(|u| u.group_id == 2)
            .map(|u| u.ordinal)
            .collect();
        assert!(
            group_ordinals.is_empty() || group_ordinals == vec![2, 3, 4],
            "group 2 split across batches"
        );
    }
}

#[test]
fn test_partition_withOversizedGroup_shouldSplitItUnderLimits() {
    let units: Vec<TranslationUnit> = (0..6).map(|i| unit(i, 0, "Shared group text")).collect();
    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 2,
        max_chars: 100_000,
    });

    let batches = batcher.partition(&units);

    assert_eq!(batches.len(), 3);
    for batch in &batches {
        assert!(batch.len() <= 2);
    }
}

#[test]
fn test_partition_withUnitOverCharCeiling_shouldKeepItWholeAsSingleton() {
    let units = vec![
        unit(0, 0, "Small."),
        unit(1, 1, "This single unit is far longer than the ceiling allows."),
        unit(2, 2, "Small."),
    ];
    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 10,
        max_chars: 20,
    });

    let batches = batcher.partition(&units);

    let flattened: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.units.iter().map(|u| u.ordinal))
        .collect();
    assert_eq!(flattened, vec![0, 1, 2]);
    // The oversized unit travels alone, never split.
    let oversized_batch = batches
        .iter()
        .find(|b| b.units.iter().any(|u| u.ordinal == 1))
        .unwrap();
    assert_eq!(oversized_batch.len(), 1);
}

#[test]
fn test_partition_withEmptyInput_shouldProduceNoBatches() {
    let batcher = UnitBatcher::new(BatchLimits::default());
    assert!(batcher.partition(&[]).is_empty());
}

#[test]
fn test_partition_withSameInput_shouldBeDeterministic() {
    let layout = LayoutExtractor::extract(&doc_bytes(&doc_with_units(&[7, 6]))).unwrap();
    let batcher = UnitBatcher::new(BatchLimits {
        max_units: 5,
        max_chars: 100_000,
    });

    let first: Vec<Vec<usize>> = batcher
        .partition(&layout.units)
        .iter()
        .map(|b| b.units.iter().map(|u| u.ordinal).collect())
        .collect();
    let second: Vec<Vec<usize>> = batcher
        .partition(&layout.units)
        .iter()
        .map(|b| b.units.iter().map(|u| u.ordinal).collect())
        .collect();

    assert_eq!(first, second);
}
