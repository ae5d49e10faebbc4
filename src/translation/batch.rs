/*!
 * Unit batching.
 *
 * Partitions the canonical unit sequence into request-sized batches under a
 * provider capacity limit. Batching is greedy and order-preserving: units are
 * accumulated until the next unit would push the batch over the limit, a unit
 * is never split, and paragraph groups are kept together whenever the whole
 * group fits within the limit.
 */

use log::warn;

use crate::document::model::TranslationUnit;

/// Provider capacity limit for one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchLimits {
    /// Maximum number of units per batch
    pub max_units: usize,
    /// Maximum combined character cost per batch
    pub max_chars: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_units: 50,
            max_chars: 4000,
        }
    }
}

/// An ordered, request-sized slice of the unit sequence.
///
/// Transient: batches exist only during dispatch, the ordinal on each unit
/// remains the canonical order.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of this batch in dispatch order
    pub index: usize,
    /// Units in ordinal order
    pub units: Vec<TranslationUnit>,
}

impl Batch {
    /// Combined character cost of the batch
    pub fn cost(&self) -> usize {
        self.units.iter().map(|u| u.cost()).sum()
    }

    /// Number of units in the batch
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the batch holds no units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Greedy, group-aware batch builder
pub struct UnitBatcher {
    limits: BatchLimits,
}

impl UnitBatcher {
    /// Create a batcher with the given limits
    pub fn new(limits: BatchLimits) -> Self {
        Self { limits }
    }

    /// Partition units into batches.
    ///
    /// Every unit lands in exactly one batch and concatenating the batches
    /// reproduces the input order. A group whose total cost fits within the
    /// limits is never split across batches; a group that alone exceeds the
    /// limits is split and logged as a degraded-fidelity case.
    pub fn partition(&self, units: &[TranslationUnit]) -> Vec<Batch> {
        let mut batches: Vec<Batch> = Vec::new();
        let mut current: Vec<TranslationUnit> = Vec::new();
        let mut current_cost = 0usize;

        for run in group_runs(units) {
            let run_cost: usize = run.iter().map(|u| u.cost()).sum();
            let run_fits_alone =
                run.len() <= self.limits.max_units && run_cost <= self.limits.max_chars;

            if run_fits_alone && run.len() > 1 {
                // Keep the paragraph together: flush the open batch if the
                // whole run does not fit into it.
                if !current.is_empty()
                    && (current.len() + run.len() > self.limits.max_units
                        || current_cost + run_cost > self.limits.max_chars)
                {
                    self.flush(&mut batches, &mut current, &mut current_cost);
                }
                current.extend(run.iter().cloned());
                current_cost += run_cost;
                continue;
            }

            if !run_fits_alone && run.len() > 1 {
                warn!(
                    "group {} ({} units, {} chars) exceeds batch limits and will be split",
                    run[0].group_id,
                    run.len(),
                    run_cost
                );
            }

            for unit in run {
                let unit_cost = unit.cost();
                let overflows = current.len() + 1 > self.limits.max_units
                    || current_cost + unit_cost > self.limits.max_chars;
                if overflows && !current.is_empty() {
                    self.flush(&mut batches, &mut current, &mut current_cost);
                }
                if unit_cost > self.limits.max_chars {
                    // A unit is never split, even when it alone exceeds the
                    // cost ceiling; it travels as a singleton batch.
                    warn!(
                        "unit {} ({} chars) exceeds the per-batch cost ceiling",
                        unit.ordinal, unit_cost
                    );
                }
                current.push(unit.clone());
                current_cost += unit_cost;
            }
        }

        self.flush(&mut batches, &mut current, &mut current_cost);
        batches
    }

    fn flush(&self, batches: &mut Vec<Batch>, current: &mut Vec<TranslationUnit>, cost: &mut usize) {
        if !current.is_empty() {
            batches.push(Batch {
                index: batches.len(),
                units: std::mem::take(current),
            });
            *cost = 0;
        }
    }
}

/// Split the ordinal-ordered sequence into runs of consecutive units sharing
/// a group id. Groups are contiguous by construction in the extractor.
fn group_runs(units: &[TranslationUnit]) -> Vec<&[TranslationUnit]> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    for i in 1..=units.len() {
        if i == units.len() || units[i].group_id != units[start].group_id {
            runs.push(&units[start..i]);
            start = i;
        }
    }
    runs
}
