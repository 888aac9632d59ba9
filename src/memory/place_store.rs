//! Place memory: per-place bias estimates with blended retrieval.
//!
//! Each [`PlaceRecord`] holds an EMA bias estimate, a slowly tracking place
//! center, a bounded history of bias samples and, once the samples agree
//! closely enough, a consolidated long-term bias.
//!
//! Reads never create records. An unknown place reads as the zero bias.
//!
//! # Example
//!
//! ```rust
//! use grid_memory::config::PlaceConfig;
//! use grid_memory::memory::{PlaceStore, Retrieval};
//!
//! let mut store = PlaceStore::new(2, &PlaceConfig::default()).unwrap();
//! let phase = [1.0, 2.0];
//! let id = store.place_id(&phase);
//! store.update_bias(id, &phase, &[0.2, 0.0], 0.0, None).unwrap();
//!
//! assert_eq!(store.bias_estimate(&phase, Retrieval::Exact), vec![0.2, 0.0]);
//! let blended = store.bias_estimate(&phase, Retrieval::Blended { top_k: 5, sigma: 0.5 });
//! assert!((blended[0] - 0.2).abs() < 1e-12);
//! ```

use crate::config::PlaceConfig;
use crate::error::{check_vector, Result};
use crate::kernel::torus::gaussian;
use crate::kernel::vector::{ema, weighted_pair, zeros};
use crate::kernel::{PlaceId, PlaceIndex, TorusMetric};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

// =============================================================================
// PlaceRecord
// =============================================================================

/// Everything remembered about one place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub(crate) place_id: PlaceId,
    pub(crate) bias_estimate: Vec<f64>,
    pub(crate) place_center: Option<Vec<f64>>,
    pub(crate) visit_count: u64,
    pub(crate) last_visit_time: f64,
    pub(crate) last_update_time: f64,
    pub(crate) bias_history: VecDeque<Vec<f64>>,
    pub(crate) consolidated_bias: Option<Vec<f64>>,
    pub(crate) consolidation_time: Option<f64>,
}

impl PlaceRecord {
    fn new(place_id: PlaceId, dimensions: usize) -> Self {
        Self {
            place_id,
            bias_estimate: zeros(dimensions),
            place_center: None,
            visit_count: 0,
            last_visit_time: 0.0,
            last_update_time: 0.0,
            bias_history: VecDeque::new(),
            consolidated_bias: None,
            consolidation_time: None,
        }
    }

    pub fn place_id(&self) -> PlaceId {
        self.place_id
    }

    pub fn bias_estimate(&self) -> &[f64] {
        &self.bias_estimate
    }

    pub fn place_center(&self) -> Option<&[f64]> {
        self.place_center.as_deref()
    }

    pub fn visit_count(&self) -> u64 {
        self.visit_count
    }

    pub fn last_visit_time(&self) -> f64 {
        self.last_visit_time
    }

    pub fn last_update_time(&self) -> f64 {
        self.last_update_time
    }

    /// Recent bias samples, oldest first.
    pub fn bias_history(&self) -> impl Iterator<Item = &[f64]> {
        self.bias_history.iter().map(|s| s.as_slice())
    }

    pub fn history_len(&self) -> usize {
        self.bias_history.len()
    }

    pub fn consolidated_bias(&self) -> Option<&[f64]> {
        self.consolidated_bias.as_deref()
    }

    pub fn consolidation_time(&self) -> Option<f64> {
        self.consolidation_time
    }

    pub fn is_consolidated(&self) -> bool {
        self.consolidated_bias.is_some()
    }

    /// The most recent `n` history samples, oldest first.
    pub fn recent_history(&self, n: usize) -> impl Iterator<Item = &[f64]> + Clone {
        let skip = self.bias_history.len().saturating_sub(n);
        self.bias_history.iter().skip(skip).map(|s| s.as_slice())
    }

    /// Promote `bias` to long-term memory. The working estimate follows.
    pub(crate) fn set_consolidated(&mut self, bias: Vec<f64>, now: f64) {
        self.bias_estimate.clone_from(&bias);
        self.consolidated_bias = Some(bias);
        self.consolidation_time = Some(now);
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// How a phase query is resolved to a bias.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Retrieval {
    /// Only the hashed place of the query.
    Exact,
    /// Gaussian-weighted average over the `top_k` nearest place centers.
    Blended { top_k: usize, sigma: f64 },
}

/// Aggregate counters over all place records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceStats {
    pub num_places: usize,
    pub total_visits: u64,
    pub avg_visits_per_place: f64,
    pub consolidated_places: usize,
}

// =============================================================================
// PlaceStore
// =============================================================================

/// Keyed storage of [`PlaceRecord`]s.
#[derive(Clone, Debug)]
pub struct PlaceStore {
    dimensions: usize,
    index: PlaceIndex,
    config: PlaceConfig,
    records: HashMap<PlaceId, PlaceRecord>,
}

impl PlaceStore {
    pub fn new(dimensions: usize, config: &PlaceConfig) -> Result<Self> {
        config.validate()?;
        let torus = TorusMetric::new(config.phase_period);
        Ok(Self {
            dimensions,
            index: PlaceIndex::new(config.num_places, config.quantization_level, torus),
            config: config.clone(),
            records: HashMap::new(),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn config(&self) -> &PlaceConfig {
        &self.config
    }

    pub fn torus(&self) -> &TorusMetric {
        self.index.torus()
    }

    pub fn place_id(&self, phase: &[f64]) -> PlaceId {
        self.index.place_id(phase)
    }

    pub fn torus_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.index.torus().distance(a, b)
    }

    /// Place-cell activation of `phase` for a field centered at `center`.
    /// `sigma` defaults to the configured field width.
    pub fn activation(&self, phase: &[f64], center: &[f64], sigma: Option<f64>) -> f64 {
        self.index
            .torus()
            .activation(phase, center, sigma.unwrap_or(self.config.field_sigma))
    }

    pub fn record(&self, place_id: PlaceId) -> Option<&PlaceRecord> {
        self.records.get(&place_id)
    }

    pub(crate) fn record_mut(&mut self, place_id: PlaceId) -> Option<&mut PlaceRecord> {
        self.records.get_mut(&place_id)
    }

    pub(crate) fn get_or_create(&mut self, place_id: PlaceId) -> &mut PlaceRecord {
        let dimensions = self.dimensions;
        self.records
            .entry(place_id)
            .or_insert_with(|| PlaceRecord::new(place_id, dimensions))
    }

    pub fn records(&self) -> impl Iterator<Item = &PlaceRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold one bias sample into a place.
    ///
    /// The first visit takes the sample as-is; later visits blend it in with
    /// `rate` (the configured learning rate when `None`). The sample joins
    /// the bounded history, and the place center moves toward `phase` at the
    /// slower center rate.
    pub fn update_bias(
        &mut self,
        place_id: PlaceId,
        phase: &[f64],
        sample: &[f64],
        time: f64,
        rate: Option<f64>,
    ) -> Result<()> {
        check_vector(sample, self.dimensions, "bias sample")?;
        check_vector(phase, self.dimensions, "phase")?;

        let rate = rate.unwrap_or(self.config.learning_rate);
        let center_rate = self.config.center_rate;
        let history_len = self.config.history_len;
        let torus = *self.index.torus();

        let record = self.get_or_create(place_id);
        if record.visit_count == 0 {
            record.bias_estimate = sample.to_vec();
        } else {
            ema(&mut record.bias_estimate, sample, rate);
        }

        if record.bias_history.len() >= history_len {
            record.bias_history.pop_front();
        }
        record.bias_history.push_back(sample.to_vec());

        let wrapped: Vec<f64> = phase.iter().map(|&p| torus.wrap(p)).collect();
        match record.place_center.as_mut() {
            Some(center) if center.len() == wrapped.len() => {
                for (c, &p) in center.iter_mut().zip(&wrapped) {
                    let near = torus.unwrap_near(*c, p);
                    *c = torus.wrap(*c + center_rate * (near - *c));
                }
            }
            _ => record.place_center = Some(wrapped),
        }

        record.visit_count += 1;
        record.last_visit_time = time;
        record.last_update_time = time;
        Ok(())
    }

    /// Bias at `phase`. Zero when nothing relevant has been learned.
    pub fn bias_estimate(&self, phase: &[f64], retrieval: Retrieval) -> Vec<f64> {
        match retrieval {
            Retrieval::Exact => self
                .records
                .get(&self.place_id(phase))
                .map(|r| r.bias_estimate.clone())
                .unwrap_or_else(|| zeros(self.dimensions)),
            Retrieval::Blended { top_k, sigma } => self.blended(phase, top_k, sigma),
        }
    }

    fn blended(&self, phase: &[f64], top_k: usize, sigma: f64) -> Vec<f64> {
        let torus = self.index.torus();
        let mut nearest: Vec<(f64, &PlaceRecord)> = self
            .records
            .values()
            .filter_map(|r| {
                r.place_center
                    .as_deref()
                    .map(|c| (torus.distance(phase, c), r))
            })
            .collect();
        // Ties broken by id so the result does not depend on map order
        nearest.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.place_id.cmp(&b.1.place_id)));
        nearest.truncate(top_k);

        let mut out = zeros(self.dimensions);
        let mut total_weight = 0.0;
        for (d, record) in &nearest {
            let w = gaussian(*d, sigma);
            for (o, b) in out.iter_mut().zip(&record.bias_estimate) {
                *o += w * b;
            }
            total_weight += w;
        }
        if total_weight > f64::MIN_POSITIVE {
            out.iter_mut().for_each(|v| *v /= total_weight);
            out
        } else {
            zeros(self.dimensions)
        }
    }

    /// Merge every pair of places whose centers lie within `threshold`.
    ///
    /// The lower id survives; bias and center become the visit-weighted
    /// average, visits add up, and the other record is removed. Returns the
    /// number of records removed.
    pub fn merge_nearby_places(&mut self, threshold: Option<f64>) -> usize {
        let threshold = threshold.unwrap_or(self.config.merge_threshold);
        let torus = *self.index.torus();
        let mut ids: Vec<PlaceId> = self.records.keys().copied().collect();
        ids.sort();

        let mut merged = 0;
        for (i, &keep_id) in ids.iter().enumerate() {
            if !self.records.contains_key(&keep_id) {
                continue;
            }
            for &other_id in &ids[i + 1..] {
                let close = match (self.records.get(&keep_id), self.records.get(&other_id)) {
                    (Some(keep), Some(other)) => match (&keep.place_center, &other.place_center) {
                        (Some(c1), Some(c2)) => torus.distance(c1, c2) < threshold,
                        _ => false,
                    },
                    _ => false,
                };
                if !close {
                    continue;
                }
                let Some(other) = self.records.remove(&other_id) else {
                    continue;
                };
                if let Some(keep) = self.records.get_mut(&keep_id) {
                    absorb(keep, other, &torus);
                    merged += 1;
                }
            }
        }
        if merged > 0 {
            log::debug!("merged {} nearby places (threshold {})", merged, threshold);
        }
        merged
    }

    pub fn stats(&self) -> PlaceStats {
        let num_places = self.records.len();
        let total_visits: u64 = self.records.values().map(|r| r.visit_count).sum();
        PlaceStats {
            num_places,
            total_visits,
            avg_visits_per_place: if num_places > 0 {
                total_visits as f64 / num_places as f64
            } else {
                0.0
            },
            consolidated_places: self.records.values().filter(|r| r.is_consolidated()).count(),
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Fold `other` into `keep` with visit-count weights.
fn absorb(keep: &mut PlaceRecord, other: PlaceRecord, torus: &TorusMetric) {
    let total = keep.visit_count + other.visit_count;
    let (w1, w2) = if total == 0 {
        (0.5, 0.5)
    } else {
        (
            keep.visit_count as f64 / total as f64,
            other.visit_count as f64 / total as f64,
        )
    };

    keep.bias_estimate = weighted_pair(&keep.bias_estimate, w1, &other.bias_estimate, w2);
    if let (Some(c1), Some(c2)) = (keep.place_center.as_mut(), other.place_center.as_ref()) {
        for (a, &b) in c1.iter_mut().zip(c2) {
            let near = torus.unwrap_near(*a, b);
            *a = torus.wrap(w1 * *a + w2 * near);
        }
    }
    keep.visit_count = total;
    keep.last_visit_time = keep.last_visit_time.max(other.last_visit_time);
    keep.last_update_time = keep.last_update_time.max(other.last_update_time);
    if keep.consolidated_bias.is_none() {
        keep.consolidated_bias = other.consolidated_bias;
        keep.consolidation_time = other.consolidation_time;
    }
}
