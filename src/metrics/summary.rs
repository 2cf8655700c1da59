// Running summary: exact count/sum plus an HdrHistogram quantile sketch,
// exposed to the registry as a Prometheus summary family.

use super::MetricsError;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, MetricFamily, MetricType};
use std::collections::HashMap;
use std::sync::Arc;

/// Quantiles reported for every summary (same objectives as the Prometheus
/// client default).
pub const QUANTILES: [f64; 3] = [0.5, 0.9, 0.99];

/// HdrHistogram precision: 3 significant figures (0.1% relative error).
const HIST_SIGFIG: u8 = 3;

/// Thread-safe summary of non-negative samples. Clones share the same data,
/// so one handle can be registered while another records.
///
/// Samples are multiplied by `scale` and rounded to integers before entering
/// the histogram, so `scale` fixes the smallest distinguishable step
/// (e.g. 1_000_000 for microsecond resolution on seconds).
#[derive(Clone)]
pub struct Summary {
    desc: Desc,
    scale: f64,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    hist: Histogram<u64>,
    count: u64,
    sum: f64,
}

#[derive(Debug, Clone)]
pub struct QuantileValue {
    pub quantile: f64,
    pub value: f64,
}

/// Point-in-time copy of a summary. `count` and `sum` always agree.
#[derive(Debug, Clone)]
pub struct SummarySnapshot {
    pub count: u64,
    pub sum: f64,
    pub quantiles: Vec<QuantileValue>,
}

impl Summary {
    pub fn new(name: &str, help: &str, scale: f64) -> Result<Self, MetricsError> {
        let desc = Desc::new(name.into(), help.into(), Vec::new(), HashMap::new())?;
        // Full u64 range up front: a growable histogram clamps before it resizes.
        let hist = Histogram::new_with_bounds(1, u64::MAX, HIST_SIGFIG)?;
        Ok(Self {
            desc,
            scale,
            inner: Arc::new(Mutex::new(Inner {
                hist,
                count: 0,
                sum: 0.0,
            })),
        })
    }

    pub fn observe(&self, value: f64) {
        let ticks = self.to_ticks(value);
        let mut inner = self.inner.lock();
        inner.count += 1;
        inner.sum += value;
        inner.hist.saturating_record(ticks);
    }

    pub fn snapshot(&self) -> SummarySnapshot {
        let inner = self.inner.lock();
        let quantiles = QUANTILES
            .iter()
            .map(|&q| QuantileValue {
                quantile: q,
                value: if inner.count == 0 {
                    f64::NAN
                } else {
                    let ticks = inner.hist.median_equivalent(inner.hist.value_at_quantile(q));
                    ticks as f64 / self.scale
                },
            })
            .collect();
        SummarySnapshot {
            count: inner.count,
            sum: inner.sum,
            quantiles,
        }
    }

    /// Float-to-int casts saturate: NaN and negatives land on 0, +inf on u64::MAX.
    fn to_ticks(&self, value: f64) -> u64 {
        (value * self.scale).round() as u64
    }
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let snap = self.snapshot();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(snap.count);
        summary.set_sample_sum(snap.sum);
        for q in &snap.quantiles {
            let mut quantile = proto::Quantile::default();
            quantile.set_quantile(q.quantile);
            quantile.set_value(q.value);
            summary.mut_quantile().push(quantile);
        }

        let mut metric = proto::Metric::default();
        metric.set_summary(summary);

        let mut family = MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        family.mut_metric().push(metric);
        vec![family]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 0.001 + 1e-9
    }

    fn summary(scale: f64) -> Summary {
        Summary::new("test_summary", "Test summary.", scale).unwrap()
    }

    #[test]
    fn empty_summary_reports_nan_quantiles() {
        let s = summary(1.0);
        let snap = s.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.sum, 0.0);
        assert_eq!(snap.quantiles.len(), QUANTILES.len());
        assert!(snap.quantiles.iter().all(|q| q.value.is_nan()));
    }

    #[test]
    fn single_value_quantiles_track_the_value() {
        let s = summary(1000.0);
        s.observe(12.5);
        let snap = s.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.sum, 12.5);
        for q in &snap.quantiles {
            assert!(close(q.value, 12.5), "q{} = {}", q.quantile, q.value);
        }
    }

    #[test]
    fn large_values_are_not_clamped() {
        let s = summary(1.0);
        s.observe(1048576.0);
        s.observe(5_000_000.0);
        let snap = s.snapshot();
        assert!(close(snap.quantiles[0].value, 1048576.0), "{}", snap.quantiles[0].value);
        assert!(close(snap.quantiles[2].value, 5_000_000.0), "{}", snap.quantiles[2].value);
    }

    #[test]
    fn huge_values_saturate_at_the_top() {
        let s = summary(1.0);
        for _ in 0..10 {
            s.observe(1e30);
        }
        s.observe(5e6);
        let snap = s.snapshot();
        assert!(snap.quantiles[1].value > 1e18, "{}", snap.quantiles[1].value);
    }

    #[test]
    fn quantiles_are_rank_based() {
        let s = summary(1.0);
        for v in 1..=100 {
            s.observe(v as f64);
        }
        let snap = s.snapshot();
        assert_eq!(snap.count, 100);
        assert_eq!(snap.sum, 5050.0);
        // Rank rounding may land one sample either side.
        assert!((snap.quantiles[0].value - 50.0).abs() <= 1.0);
        assert!((snap.quantiles[1].value - 90.0).abs() <= 1.0);
        assert!((snap.quantiles[2].value - 99.0).abs() <= 1.0);
    }

    #[test]
    fn zero_is_recorded() {
        let s = summary(1_000_000.0);
        s.observe(0.0);
        let snap = s.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.quantiles[0].value, 0.0);
    }

    #[test]
    fn collect_emits_one_summary_family() {
        let s = summary(1_000_000.0);
        s.observe(0.023);
        s.observe(0.023);
        let families = s.collect();
        assert_eq!(families.len(), 1);
        let family = &families[0];
        assert_eq!(family.get_name(), "test_summary");
        assert_eq!(family.get_help(), "Test summary.");
        assert_eq!(family.get_field_type(), MetricType::SUMMARY);
        let summary = family.get_metric()[0].get_summary();
        assert_eq!(summary.get_sample_count(), 2);
        assert!(close(summary.get_sample_sum(), 0.046));
        let quantiles = summary.get_quantile();
        assert_eq!(quantiles.len(), QUANTILES.len());
        assert_eq!(quantiles[0].get_quantile(), 0.5);
        assert!(close(quantiles[0].get_value(), 0.023), "{}", quantiles[0].get_value());
    }
}
