//! Summary collector with sliding-window quantiles.
//!
//! The prometheus crate ships counters, gauges and histograms but no summary
//! type, so this plugs one into the registry through the `Collector` trait.
//! Each label set keeps the most recent `window` observations; quantiles are
//! computed over that window at scrape time, count and sum are cumulative.

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, MetricFamily, MetricType};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_QUANTILES: &[f64] = &[0.5, 0.9, 0.95, 0.99];
pub const DEFAULT_WINDOW: usize = 1024;

#[derive(Default)]
struct Series {
    samples: VecDeque<f64>,
    count: u64,
    sum: f64,
}

impl Series {
    fn observe(&mut self, value: f64, window: usize) {
        if self.samples.len() == window {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.count += 1;
        self.sum += value;
    }

    fn quantiles(&self, quantiles: &[f64]) -> Vec<(f64, f64)> {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        quantiles
            .iter()
            .map(|&q| (q, nearest_rank(&sorted, q)))
            .collect()
    }
}

/// Nearest-rank quantile; NaN for an empty window
fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

pub struct SummaryVec {
    desc: Desc,
    quantiles: Vec<f64>,
    window: usize,
    series: Mutex<HashMap<Vec<String>, Series>>,
}

impl SummaryVec {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> prometheus::Result<Self> {
        Self::with_window(name, help, label_names, DEFAULT_QUANTILES, DEFAULT_WINDOW)
    }

    pub fn with_window(
        name: &str,
        help: &str,
        label_names: &[&str],
        quantiles: &[f64],
        window: usize,
    ) -> prometheus::Result<Self> {
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            label_names.iter().map(|l| l.to_string()).collect(),
            HashMap::new(),
        )?;

        Ok(Self {
            desc,
            quantiles: quantiles.to_vec(),
            window: window.max(1),
            series: Mutex::new(HashMap::new()),
        })
    }

    pub fn observe(&self, label_values: &[&str], value: f64) {
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        self.series
            .lock()
            .entry(key)
            .or_default()
            .observe(value, self.window);
    }

    pub fn sample_count(&self, label_values: &[&str]) -> u64 {
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        self.series.lock().get(&key).map_or(0, |s| s.count)
    }

    pub fn reset(&self) {
        self.series.lock().clear();
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let series = self.series.lock();
        if series.is_empty() {
            return Vec::new();
        }

        let mut family = MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);

        for (label_values, s) in series.iter() {
            let mut summary = proto::Summary::default();
            summary.set_sample_count(s.count);
            summary.set_sample_sum(s.sum);
            for (q, v) in s.quantiles(&self.quantiles) {
                let mut quantile = proto::Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(v);
                summary.mut_quantile().push(quantile);
            }

            let mut metric = proto::Metric::default();
            for (name, value) in self.desc.variable_labels.iter().zip(label_values) {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }
            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}
