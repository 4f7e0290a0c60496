use log::trace;

use super::{Emission, HistogramReducer, ReducerMode, midpoint};
use crate::catalog::BucketedDistribution;
use crate::naming::MappedName;

/// Statistics estimated from one histogram snapshot.
///
/// Every observation is assumed to sit at its bucket's midpoint, so the
/// error of each figure is bounded by the width of the bucket it comes from.
/// Buckets with an infinite edge are ignored. A histogram with no
/// observations in finite buckets yields `NaN` for every field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub avg: f64,
    pub min: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl SummaryStats {
    pub fn from_distribution(hist: &BucketedDistribution) -> Self {
        Self {
            avg: average(hist),
            min: percentile(hist, 0.0),
            median: percentile(hist, 0.5),
            p95: percentile(hist, 0.95),
            p99: percentile(hist, 0.99),
            max: percentile(hist, 1.0),
        }
    }

    /// The statistics paired with the name segment they are reported under
    pub fn named(&self) -> [(&'static str, f64); 6] {
        [
            ("avg", self.avg),
            ("min", self.min),
            ("median", self.median),
            ("p95", self.p95),
            ("p99", self.p99),
            ("max", self.max),
        ]
    }
}

/// Weighted mean of finite bucket midpoints, `NaN` without observations
pub fn average(hist: &BucketedDistribution) -> f64 {
    let (sum, count) = hist
        .finite_buckets()
        .fold((0.0, 0u128), |(sum, count), (lo, hi, n)| {
            (sum + n as f64 * midpoint(lo, hi), count + u128::from(n))
        });
    if count == 0 {
        return f64::NAN;
    }
    sum / count as f64
}

/// Estimate the `p` quantile, `p` in `[0, 1]`.
///
/// `p == 0` is the lower edge of the first finite bucket and `p == 1` the
/// upper edge of the bucket holding the last observation; anything between
/// is the midpoint of the first bucket where the cumulative count reaches
/// `p` of the total.
pub fn percentile(hist: &BucketedDistribution, p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }

    // Widened so counts near u64::MAX cannot overflow the running totals
    let count_sum: u128 = hist.finite_buckets().map(|(_, _, n)| u128::from(n)).sum();
    if count_sum == 0 {
        return f64::NAN;
    }

    if p == 0.0 {
        return hist
            .finite_buckets()
            .next()
            .map_or(f64::NAN, |(lo, _, _)| lo);
    }

    let target = count_sum as f64 * p;
    let mut count_cum = 0u128;
    for (lo, hi, n) in hist.finite_buckets() {
        count_cum += u128::from(n);
        if p == 1.0 {
            // Exact, as f64 rounding can hide the last few observations
            if count_cum >= count_sum {
                return hi;
            }
        } else if count_cum as f64 >= target {
            return midpoint(lo, hi);
        }
    }
    f64::NAN
}

/// Reports every histogram as summary statistic gauges.
///
/// Names follow `<name>.<unit>` for the average and `<name>.<stat>.<unit>`
/// for each statistic. `NaN` figures are not emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryReducer;

impl HistogramReducer for SummaryReducer {
    fn reduce(&mut self, name: &MappedName, hist: &BucketedDistribution) -> Vec<Emission> {
        let stats = SummaryStats::from_distribution(hist);
        if stats.avg.is_nan() {
            trace!("No finite observations in {}, skipping", name.full());
            return Vec::new();
        }

        let mut out = Vec::with_capacity(7);
        out.push(Emission::Gauge {
            name: name.full(),
            value: stats.avg,
        });
        for (stat, value) in stats.named() {
            if value.is_nan() {
                continue;
            }
            out.push(Emission::Gauge {
                name: name.with_stat(stat),
                value,
            });
        }
        out
    }

    fn mode(&self) -> ReducerMode {
        ReducerMode::Summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INF: f64 = f64::INFINITY;

    fn hist(boundaries: &[f64], counts: &[u64]) -> BucketedDistribution {
        BucketedDistribution::new(boundaries.to_vec(), counts.to_vec()).unwrap()
    }

    fn assert_close(got: f64, want: f64) {
        assert!((got - want).abs() <= 0.1, "got={} want={}", got, want);
    }

    fn assert_stats(stats: SummaryStats) {
        assert_close(stats.avg, 23.39);
        assert_close(stats.min, 1.0);
        assert_close(stats.median, 26.0);
        assert_close(stats.p95, 36.0);
        assert_close(stats.p99, 46.0);
        assert_close(stats.max, 51.0);
    }

    #[test]
    fn test_summary_of_finite_histogram() {
        let h = hist(&[1.0, 11.0, 21.0, 31.0, 41.0, 51.0], &[2, 7, 10, 3, 1]);
        assert_stats(SummaryStats::from_distribution(&h));
    }

    #[test]
    fn test_infinite_buckets_are_ignored() {
        let h = hist(
            &[-INF, 1.0, 11.0, 21.0, 31.0, 41.0, 51.0, INF],
            &[100, 2, 7, 10, 3, 1, 100],
        );
        assert_stats(SummaryStats::from_distribution(&h));

        // Moving mass between overflow buckets changes nothing
        let shifted = hist(
            &[-INF, 1.0, 11.0, 21.0, 31.0, 41.0, 51.0, INF],
            &[0, 2, 7, 10, 3, 1, 5000],
        );
        assert_eq!(
            SummaryStats::from_distribution(&h),
            SummaryStats::from_distribution(&shifted)
        );
    }

    #[test]
    fn test_statistics_are_ordered() {
        let cases: &[&[u64]] = &[
            &[2, 7, 10, 3, 1],
            &[1, 0, 0, 0, 0],
            &[0, 0, 0, 0, 9],
            &[5, 5, 5, 5, 5],
            &[100, 0, 0, 0, 1],
            &[0, 3, 0, 1, 0],
        ];
        let bounds = [0.0, 0.5, 2.0, 10.0, 100.0, 1000.0];
        for counts in cases {
            let s = SummaryStats::from_distribution(&hist(&bounds, counts));
            assert!(s.min <= s.median, "{:?}", s);
            assert!(s.median <= s.p95, "{:?}", s);
            assert!(s.p95 <= s.p99, "{:?}", s);
            assert!(s.p99 <= s.max, "{:?}", s);
            assert!(s.min <= s.avg && s.avg <= s.max, "{:?}", s);
        }
    }

    #[test]
    fn test_single_bucket_degenerates() {
        let h = hist(&[-INF, 10.0, 20.0, INF], &[3, 42, 8]);
        let s = SummaryStats::from_distribution(&h);
        assert_eq!(s.avg, 15.0);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.median, 15.0);
        assert_eq!(s.p95, 15.0);
        assert_eq!(s.p99, 15.0);
        assert_eq!(s.max, 20.0);
    }

    #[test]
    fn test_no_finite_observations_is_nan() {
        let all_infinite = hist(&[-INF, 0.0, INF], &[4, 4]);
        let s = SummaryStats::from_distribution(&all_infinite);
        for (_, value) in s.named() {
            assert!(value.is_nan());
        }

        let empty = hist(&[0.0, 1.0, 2.0], &[0, 0]);
        assert!(average(&empty).is_nan());
        assert!(percentile(&empty, 0.5).is_nan());
    }

    #[test]
    fn test_percentile_out_of_range_is_nan() {
        let h = hist(&[0.0, 1.0], &[1]);
        assert!(percentile(&h, -0.1).is_nan());
        assert!(percentile(&h, 1.5).is_nan());
        assert!(percentile(&h, f64::NAN).is_nan());
    }

    #[test]
    fn test_max_uses_last_occupied_bucket() {
        let h = hist(&[0.0, 10.0, 20.0, 30.0], &[1, 1, 0]);
        assert_eq!(percentile(&h, 1.0), 20.0);
    }

    #[test]
    fn test_huge_counts_do_not_overflow() {
        let h = hist(&[0.0, 1.0, 2.0], &[u64::MAX, 1]);
        let s = SummaryStats::from_distribution(&h);
        assert_close(s.avg, 0.5);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.median, 0.5);
        assert_eq!(s.p99, 0.5);
        assert_eq!(s.max, 2.0);
    }

    #[test]
    fn test_summary_reducer_names() {
        let h = hist(&[1.0, 11.0, 21.0, 31.0, 41.0, 51.0], &[2, 7, 10, 3, 1]);
        let name = MappedName {
            name: "runtime.test.sched.latencies".to_string(),
            unit: "seconds".to_string(),
        };
        let out = SummaryReducer.reduce(&name, &h);
        let names: Vec<&str> = out.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "runtime.test.sched.latencies.seconds",
                "runtime.test.sched.latencies.avg.seconds",
                "runtime.test.sched.latencies.min.seconds",
                "runtime.test.sched.latencies.median.seconds",
                "runtime.test.sched.latencies.p95.seconds",
                "runtime.test.sched.latencies.p99.seconds",
                "runtime.test.sched.latencies.max.seconds",
            ]
        );
        assert_eq!(
            out[6],
            Emission::Gauge {
                name: "runtime.test.sched.latencies.max.seconds".to_string(),
                value: 51.0
            }
        );
    }

    #[test]
    fn test_summary_reducer_skips_empty_histograms() {
        let h = hist(&[0.0, 1.0], &[0]);
        let name = MappedName {
            name: "runtime.test.x".to_string(),
            unit: "bytes".to_string(),
        };
        assert!(SummaryReducer.reduce(&name, &h).is_empty());
    }
}
