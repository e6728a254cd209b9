use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::Serialize;

/// Square count matrix over the union of states observed in either
/// sequence, keyed `(predicted, actual)`. The cell sum always equals the
/// compared sequence length.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    states: Vec<String>,
    cells: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn build(predicted: &[String], actual: &[String]) -> Self {
        let mut states = predicted
            .iter()
            .chain(actual.iter())
            .cloned()
            .collect::<Vec<String>>();
        states.sort();
        states.dedup();

        let index = states
            .iter()
            .enumerate()
            .map(|(position, state)| (state.as_str(), position))
            .collect::<BTreeMap<&str, usize>>();

        let mut cells = vec![vec![0_usize; states.len()]; states.len()];
        for (pred, act) in predicted.iter().zip(actual.iter()) {
            cells[index[pred.as_str()]][index[act.as_str()]] += 1;
        }

        Self { states, cells }
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn count(&self, predicted: usize, actual: usize) -> usize {
        self.cells[predicted][actual]
    }

    /// Total predicted as this state.
    pub fn row_sum(&self, predicted: usize) -> usize {
        self.cells[predicted].iter().sum()
    }

    /// Total actually in this state (the state's support).
    pub fn column_sum(&self, actual: usize) -> usize {
        self.cells.iter().map(|row| row[actual]).sum()
    }

    pub fn total(&self) -> usize {
        self.cells.iter().flatten().sum()
    }

    pub fn to_nested_map(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        self.states
            .iter()
            .enumerate()
            .map(|(row, predicted)| {
                let columns = self
                    .states
                    .iter()
                    .enumerate()
                    .map(|(column, actual)| (actual.clone(), self.cells[row][column]))
                    .collect::<BTreeMap<String, usize>>();
                (predicted.clone(), columns)
            })
            .collect()
    }
}

/// Per-state agreement metrics on the 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// One off-diagonal confusion cell: the algorithm said `predicted` where
/// ground truth held `actual`, `count` times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionPair {
    pub predicted: String,
    pub actual: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct ComparisonMetrics {
    pub agreement_rate: f64,
    pub matches: usize,
    pub total: usize,
    pub confusion: ConfusionMatrix,
    pub state_metrics: BTreeMap<String, StateMetrics>,
    pub common_errors: Vec<ConfusionPair>,
}

/// Computes agreement statistics for two equal-length state sequences.
/// Sequences of unequal length must be aligned first; passing them here is a
/// caller bug, not a data condition, and is rejected.
pub fn compare(predicted: &[String], actual: &[String]) -> Result<ComparisonMetrics> {
    if predicted.len() != actual.len() {
        bail!(
            "sequence lengths differ after alignment: predicted={}, actual={}",
            predicted.len(),
            actual.len()
        );
    }

    let total = predicted.len();
    let matches = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(pred, act)| pred == act)
        .count();
    let agreement_rate = if total > 0 {
        matches as f64 * 100.0 / total as f64
    } else {
        0.0
    };

    let confusion = ConfusionMatrix::build(predicted, actual);

    let mut state_metrics = BTreeMap::new();
    for (position, state) in confusion.states().iter().enumerate() {
        let true_positive = confusion.count(position, position);
        let false_positive = confusion.row_sum(position) - true_positive;
        let false_negative = confusion.column_sum(position) - true_positive;

        let precision = percentage(true_positive, true_positive + false_positive);
        let recall = percentage(true_positive, true_positive + false_negative);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        state_metrics.insert(
            state.clone(),
            StateMetrics {
                precision,
                recall,
                f1,
                support: confusion.column_sum(position),
            },
        );
    }

    let common_errors = rank_errors(&confusion);

    Ok(ComparisonMetrics {
        agreement_rate,
        matches,
        total,
        confusion,
        state_metrics,
        common_errors,
    })
}

fn percentage(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 * 100.0 / denominator as f64
    } else {
        0.0
    }
}

/// Every off-diagonal cell with a nonzero count, descending by count.
/// Ties break on state names so the ranking is deterministic.
fn rank_errors(confusion: &ConfusionMatrix) -> Vec<ConfusionPair> {
    let mut errors = Vec::new();

    for (row, predicted) in confusion.states().iter().enumerate() {
        for (column, actual) in confusion.states().iter().enumerate() {
            if row == column {
                continue;
            }
            let count = confusion.count(row, column);
            if count > 0 {
                errors.push(ConfusionPair {
                    predicted: predicted.clone(),
                    actual: actual.clone(),
                    count,
                });
            }
        }
    }

    errors.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.predicted.cmp(&b.predicted))
            .then_with(|| a.actual.cmp(&b.actual))
    });

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(states: &[&str]) -> Vec<String> {
        states.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn confusion_cells_sum_to_sequence_length() {
        let predicted = seq(&["A", "B", "A", "C", "B", "B"]);
        let actual = seq(&["A", "A", "A", "C", "B", "C"]);

        let metrics = compare(&predicted, &actual).expect("comparison should succeed");

        assert_eq!(metrics.confusion.total(), 6);
        for (position, state) in metrics.confusion.states().iter().enumerate() {
            let support = actual.iter().filter(|s| *s == state).count();
            assert_eq!(metrics.confusion.column_sum(position), support);
            assert_eq!(metrics.state_metrics[state].support, support);
        }
    }

    #[test]
    fn perfect_agreement_scores_hundred_everywhere() {
        let states = seq(&["open", "open", "closed", "open", "closed"]);

        let metrics = compare(&states, &states).expect("comparison should succeed");

        assert_eq!(metrics.agreement_rate, 100.0);
        assert_eq!(metrics.matches, 5);
        assert!(metrics.common_errors.is_empty());
        for state_metrics in metrics.state_metrics.values() {
            assert_eq!(state_metrics.precision, 100.0);
            assert_eq!(state_metrics.recall, 100.0);
            assert_eq!(state_metrics.f1, 100.0);
        }
    }

    #[test]
    fn zero_support_state_reports_zero_recall_without_division_error() {
        // "ghost" is predicted but never actually occurs.
        let predicted = seq(&["ghost", "A", "A"]);
        let actual = seq(&["A", "A", "A"]);

        let metrics = compare(&predicted, &actual).expect("comparison should succeed");

        let ghost = &metrics.state_metrics["ghost"];
        assert_eq!(ghost.support, 0);
        assert_eq!(ghost.recall, 0.0);
        assert_eq!(ghost.precision, 0.0);
        assert_eq!(ghost.f1, 0.0);

        // The ghost state contributes a false positive but no false-negative
        // entry beyond its zero count.
        assert!(
            metrics
                .common_errors
                .iter()
                .all(|error| error.actual != "ghost" || error.count > 0)
        );
    }

    #[test]
    fn empty_sequences_yield_zero_agreement() {
        let metrics = compare(&[], &[]).expect("comparison should succeed");
        assert_eq!(metrics.agreement_rate, 0.0);
        assert_eq!(metrics.total, 0);
        assert!(metrics.state_metrics.is_empty());
    }

    #[test]
    fn mismatched_lengths_are_a_caller_error() {
        assert!(compare(&seq(&["A"]), &seq(&["A", "B"])).is_err());
    }

    #[test]
    fn common_errors_rank_descending_by_count() {
        let predicted = seq(&["A", "A", "A", "B", "B", "C"]);
        let actual = seq(&["B", "B", "B", "C", "C", "C"]);

        let metrics = compare(&predicted, &actual).expect("comparison should succeed");

        assert_eq!(metrics.common_errors.len(), 2);
        assert_eq!(metrics.common_errors[0].predicted, "A");
        assert_eq!(metrics.common_errors[0].actual, "B");
        assert_eq!(metrics.common_errors[0].count, 3);
        assert_eq!(metrics.common_errors[1].predicted, "B");
        assert_eq!(metrics.common_errors[1].actual, "C");
        assert_eq!(metrics.common_errors[1].count, 2);
    }
}
