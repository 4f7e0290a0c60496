use std::collections::HashMap;

use log::debug;

use super::{Emission, HistogramReducer, ReducerMode, midpoint};
use crate::catalog::BucketedDistribution;
use crate::naming::MappedName;

/// `weight` observations near `value` happened since the previous sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaEvent {
    pub value: f64,
    pub weight: u64,
}

/// Per-histogram memory of the last snapshot seen
#[derive(Debug, Clone, Default)]
struct ReducerState {
    previous: Option<BucketedDistribution>,
}

/// Turns cumulative histogram snapshots into incremental weighted events.
///
/// The first snapshot of a key reports its full cumulative counts, treating
/// everything since process start as one interval. A snapshot whose bucket
/// layout differs from the stored one, or in which any bucket count went
/// down, is treated the same way: the source restarted, so the old state is
/// dropped instead of producing negative weights.
#[derive(Debug, Default)]
pub struct DeltaReducer {
    states: HashMap<String, ReducerState>,
}

impl DeltaReducer {
    /// A reducer that has seen no snapshots yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Difference `hist` against the previous snapshot stored under `key`
    pub fn update(&mut self, key: &str, hist: &BucketedDistribution) -> Vec<DeltaEvent> {
        let state = self.states.entry(key.to_string()).or_default();

        let previous = state.previous.as_ref().filter(|prev| {
            if !prev.same_layout(hist) {
                debug!("Bucket layout of {} changed, resetting", key);
                return false;
            }
            if prev.counts().iter().zip(hist.counts()).any(|(old, new)| new < old) {
                debug!("Counts of {} went down, resetting", key);
                return false;
            }
            true
        });

        let events = hist
            .buckets()
            .enumerate()
            .filter(|(_, (lo, hi, _))| lo.is_finite() && hi.is_finite())
            .filter_map(|(i, (lo, hi, count))| {
                let diff = match previous {
                    Some(prev) => count - prev.counts()[i],
                    None => count,
                };
                (diff > 0).then(|| DeltaEvent {
                    value: midpoint(lo, hi),
                    weight: diff,
                })
            })
            .collect();

        state.previous = Some(hist.clone());
        events
    }

    /// Number of histograms with remembered state
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Forget the state of one histogram
    pub fn forget(&mut self, key: &str) -> bool {
        self.states.remove(key).is_some()
    }
}

impl HistogramReducer for DeltaReducer {
    fn reduce(&mut self, name: &MappedName, hist: &BucketedDistribution) -> Vec<Emission> {
        let key = name.full();
        self.update(&key, hist)
            .into_iter()
            .map(|e| Emission::Distribution {
                name: key.clone(),
                value: e.value,
                weight: e.weight as f64,
            })
            .collect()
    }

    fn mode(&self) -> ReducerMode {
        ReducerMode::Delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: [f64; 6] = [1.0, 11.0, 21.0, 31.0, 41.0, 51.0];

    fn hist(counts: &[u64]) -> BucketedDistribution {
        BucketedDistribution::new(BOUNDS.to_vec(), counts.to_vec()).unwrap()
    }

    fn events(pairs: &[(f64, u64)]) -> Vec<DeltaEvent> {
        pairs
            .iter()
            .map(|&(value, weight)| DeltaEvent { value, weight })
            .collect()
    }

    #[test]
    fn test_first_and_second_pass() {
        let mut reducer = DeltaReducer::new();

        let first = reducer.update("lat", &hist(&[2, 7, 10, 3, 1]));
        assert_eq!(
            first,
            events(&[(6.0, 2), (16.0, 7), (26.0, 10), (36.0, 3), (46.0, 1)])
        );

        let second = reducer.update("lat", &hist(&[3, 7, 10, 5, 1]));
        assert_eq!(second, events(&[(6.0, 1), (36.0, 2)]));
    }

    #[test]
    fn test_identical_snapshots_emit_nothing() {
        let mut reducer = DeltaReducer::new();
        reducer.update("lat", &hist(&[2, 7, 10, 3, 1]));
        assert!(reducer.update("lat", &hist(&[2, 7, 10, 3, 1])).is_empty());
    }

    #[test]
    fn test_weights_sum_to_final_count() {
        let passes: [[u64; 5]; 4] = [
            [0, 1, 0, 0, 0],
            [4, 1, 2, 0, 0],
            [4, 1, 2, 0, 0],
            [9, 3, 2, 6, 1],
        ];
        let mut reducer = DeltaReducer::new();
        let total: u64 = passes
            .iter()
            .flat_map(|counts| reducer.update("lat", &hist(counts)))
            .map(|e| e.weight)
            .sum();
        assert_eq!(total, 21);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut reducer = DeltaReducer::new();
        reducer.update("a", &hist(&[1, 1, 1, 1, 1]));
        let b = reducer.update("b", &hist(&[1, 0, 0, 0, 0]));
        assert_eq!(b, events(&[(6.0, 1)]));
        assert_eq!(reducer.tracked(), 2);
        assert!(reducer.forget("a"));
        assert!(!reducer.forget("a"));
    }

    #[test]
    fn test_infinite_buckets_are_skipped() {
        let mut reducer = DeltaReducer::new();
        let h = BucketedDistribution::new(
            vec![f64::NEG_INFINITY, 0.0, 10.0, f64::INFINITY],
            vec![5, 2, 9],
        )
        .unwrap();
        assert_eq!(reducer.update("x", &h), events(&[(5.0, 2)]));
    }

    #[test]
    fn test_decreasing_counts_reset_state() {
        let mut reducer = DeltaReducer::new();
        reducer.update("lat", &hist(&[5, 5, 5, 5, 5]));
        let after_restart = reducer.update("lat", &hist(&[1, 6, 0, 0, 0]));
        assert_eq!(after_restart, events(&[(6.0, 1), (16.0, 6)]));

        // The restarted snapshot is the new baseline
        let next = reducer.update("lat", &hist(&[2, 6, 0, 0, 0]));
        assert_eq!(next, events(&[(6.0, 1)]));
    }

    #[test]
    fn test_layout_change_resets_state() {
        let mut reducer = DeltaReducer::new();
        reducer.update("lat", &hist(&[5, 5, 5, 5, 5]));
        let wider = BucketedDistribution::new(vec![0.0, 2.0, 4.0], vec![3, 1]).unwrap();
        assert_eq!(
            reducer.update("lat", &wider),
            events(&[(1.0, 3), (3.0, 1)])
        );
    }

    #[test]
    fn test_moved_edges_reset_state() {
        let mut reducer = DeltaReducer::new();
        let before = BucketedDistribution::new(vec![0.0, 1.0, 2.0], vec![3, 5]).unwrap();
        reducer.update("lat", &before);

        // Same bucket count, different upper edge: full counts again
        let moved = BucketedDistribution::new(vec![0.0, 1.0, 3.0], vec![5, 6]).unwrap();
        assert_eq!(
            reducer.update("lat", &moved),
            events(&[(0.5, 5), (2.0, 6)])
        );
    }

    #[test]
    fn test_stored_snapshot_is_independent_copy() {
        let mut reducer = DeltaReducer::new();
        let mut current = hist(&[1, 1, 1, 1, 1]);
        reducer.update("lat", &current);
        current = hist(&[2, 1, 1, 1, 1]);
        assert_eq!(reducer.update("lat", &current), events(&[(6.0, 1)]));
    }

    #[test]
    fn test_reduce_emits_distributions_under_full_name() {
        let mut reducer = DeltaReducer::new();
        let name = MappedName {
            name: "runtime.test.sched.latencies".to_string(),
            unit: "seconds".to_string(),
        };
        let out = reducer.reduce(&name, &hist(&[0, 0, 4, 0, 0]));
        assert_eq!(
            out,
            vec![Emission::Distribution {
                name: "runtime.test.sched.latencies.seconds".to_string(),
                value: 26.0,
                weight: 4.0,
            }]
        );
    }
}
