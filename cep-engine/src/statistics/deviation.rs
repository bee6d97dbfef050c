//! Relative-deviation tests between two snapshots of one statistic

use super::{StatisticValue, StatisticsKind};

/// Compares a new value of a statistic against the previous one
///
/// An entry deviates when `new > prev * (1 + t)` or `new < prev * (1 - t)`.
/// A single deviating entry makes the whole statistic deviated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviationTester {
    ArrivalRate { threshold: f64 },
    Selectivity { threshold: f64 },
}

impl DeviationTester {
    /// Tester for the given statistic kind
    pub fn for_kind(kind: StatisticsKind, threshold: f64) -> Self {
        match kind {
            StatisticsKind::ArrivalRates => DeviationTester::ArrivalRate { threshold },
            StatisticsKind::Selectivity => DeviationTester::Selectivity { threshold },
        }
    }

    /// Statistic kind this tester applies to
    pub fn kind(&self) -> StatisticsKind {
        match self {
            DeviationTester::ArrivalRate { .. } => StatisticsKind::ArrivalRates,
            DeviationTester::Selectivity { .. } => StatisticsKind::Selectivity,
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            DeviationTester::ArrivalRate { threshold } | DeviationTester::Selectivity { threshold } => {
                *threshold
            }
        }
    }

    /// True if `new` deviates from `prev`
    ///
    /// Values of a different shape (length, or a vector where a matrix is
    /// expected) always count as deviated.
    pub fn is_deviated(&self, new: &StatisticValue, prev: &StatisticValue) -> bool {
        let threshold = self.threshold();
        match (self, new, prev) {
            (
                DeviationTester::ArrivalRate { .. },
                StatisticValue::Vector(new),
                StatisticValue::Vector(prev),
            ) => {
                new.len() != prev.len()
                    || new
                        .iter()
                        .zip(prev)
                        .any(|(n, p)| entry_deviates(*n, *p, threshold))
            }
            (
                DeviationTester::Selectivity { .. },
                StatisticValue::Matrix(new),
                StatisticValue::Matrix(prev),
            ) => {
                if new.len() != prev.len() {
                    return true;
                }
                new.iter().zip(prev).enumerate().any(|(i, (new_row, prev_row))| {
                    (0..=i).any(|j| match (new_row.get(j), prev_row.get(j)) {
                        (Some(n), Some(p)) => entry_deviates(*n, *p, threshold),
                        (None, None) => false,
                        _ => true,
                    })
                })
            }
            _ => true,
        }
    }
}

fn entry_deviates(new: f64, prev: f64, threshold: f64) -> bool {
    new > prev * (1.0 + threshold) || new < prev * (1.0 - threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(values: &[f64]) -> StatisticValue {
        StatisticValue::Vector(values.to_vec())
    }

    #[test]
    fn test_arrival_rate_threshold_boundary() {
        let tester = DeviationTester::for_kind(StatisticsKind::ArrivalRates, 0.5);
        assert!(!tester.is_deviated(&rates(&[14.0]), &rates(&[10.0])));
        assert!(!tester.is_deviated(&rates(&[15.0]), &rates(&[10.0])));
        assert!(tester.is_deviated(&rates(&[16.0]), &rates(&[10.0])));
        assert!(tester.is_deviated(&rates(&[4.0]), &rates(&[10.0])));
        assert!(!tester.is_deviated(&rates(&[5.0]), &rates(&[10.0])));
    }

    #[test]
    fn test_single_entry_deviation_is_enough() {
        let tester = DeviationTester::ArrivalRate { threshold: 0.5 };
        assert!(tester.is_deviated(&rates(&[16.0, 10.0]), &rates(&[10.0, 10.0])));
    }

    #[test]
    fn test_zero_previous_value() {
        let tester = DeviationTester::ArrivalRate { threshold: 10.0 };
        assert!(tester.is_deviated(&rates(&[0.001]), &rates(&[0.0])));
        assert!(!tester.is_deviated(&rates(&[0.0]), &rates(&[0.0])));
    }

    #[test]
    fn test_selectivity_only_compares_lower_triangle() {
        let tester = DeviationTester::for_kind(StatisticsKind::Selectivity, 0.1);
        let prev = StatisticValue::Matrix(vec![vec![1.0, 9.0], vec![0.5, 1.0]]);
        // The (0, 1) entry sits above the diagonal and is not compared
        let new = StatisticValue::Matrix(vec![vec![1.0, 0.0], vec![0.5, 1.0]]);
        assert!(!tester.is_deviated(&new, &prev));

        let new = StatisticValue::Matrix(vec![vec![1.0], vec![0.8, 1.0]]);
        assert!(tester.is_deviated(&new, &prev));
    }

    #[test]
    fn test_shape_mismatch_deviates() {
        let tester = DeviationTester::ArrivalRate { threshold: 1.0 };
        assert!(tester.is_deviated(&rates(&[1.0, 1.0]), &rates(&[1.0])));
        assert!(tester.is_deviated(&StatisticValue::Matrix(vec![]), &rates(&[1.0])));
    }
}
