//! Context memory: bias keyed by (place, context).
//!
//! The same physical place can drift differently under different tools,
//! temperatures or process steps. Keeping a separate record per
//! `(PlaceId, ContextId)` pair means learning under one context never
//! touches another's estimate.

use crate::config::ContextConfig;
use crate::error::{check_vector, Result};
use crate::kernel::vector::{ema, zeros};
use crate::kernel::{ContextId, ContextIndex, PlaceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bias learned for one place under one context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextRecord {
    pub(crate) place_id: PlaceId,
    pub(crate) context_id: ContextId,
    pub(crate) bias_estimate: Vec<f64>,
    pub(crate) visit_count: u64,
    pub(crate) last_visit_time: f64,
}

impl ContextRecord {
    pub fn place_id(&self) -> PlaceId {
        self.place_id
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn bias_estimate(&self) -> &[f64] {
        &self.bias_estimate
    }

    pub fn visit_count(&self) -> u64 {
        self.visit_count
    }

    pub fn last_visit_time(&self) -> f64 {
        self.last_visit_time
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub num_contexts: usize,
    pub total_visits: u64,
    pub avg_visits_per_context: f64,
}

/// Keyed storage of [`ContextRecord`]s.
#[derive(Clone, Debug)]
pub struct ContextStore {
    dimensions: usize,
    index: ContextIndex,
    learning_rate: f64,
    records: HashMap<(PlaceId, ContextId), ContextRecord>,
}

impl ContextStore {
    /// `learning_rate` is the default EMA rate for [`update`](Self::update).
    pub fn new(dimensions: usize, config: &ContextConfig, learning_rate: f64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dimensions,
            index: ContextIndex::new(config.num_contexts),
            learning_rate,
            records: HashMap::new(),
        })
    }

    pub fn index(&self) -> &ContextIndex {
        &self.index
    }

    pub fn record(&self, place_id: PlaceId, context_id: ContextId) -> Option<&ContextRecord> {
        self.records.get(&(place_id, context_id))
    }

    pub fn records(&self) -> impl Iterator<Item = &ContextRecord> {
        self.records.values()
    }

    /// Records for one place, across all contexts.
    pub fn records_for(&self, place_id: PlaceId) -> impl Iterator<Item = &ContextRecord> {
        self.records.values().filter(move |r| r.place_id == place_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold one bias sample into the `(place, context)` record.
    /// Same EMA rule as places: the first visit takes the sample.
    pub fn update(
        &mut self,
        place_id: PlaceId,
        context_id: ContextId,
        sample: &[f64],
        time: f64,
        rate: Option<f64>,
    ) -> Result<()> {
        check_vector(sample, self.dimensions, "bias sample")?;
        let rate = rate.unwrap_or(self.learning_rate);
        let dimensions = self.dimensions;

        let record = self
            .records
            .entry((place_id, context_id))
            .or_insert_with(|| ContextRecord {
                place_id,
                context_id,
                bias_estimate: zeros(dimensions),
                visit_count: 0,
                last_visit_time: time,
            });
        if record.visit_count == 0 {
            record.bias_estimate = sample.to_vec();
        } else {
            ema(&mut record.bias_estimate, sample, rate);
        }
        record.visit_count += 1;
        record.last_visit_time = time;
        Ok(())
    }

    /// Bias for the pair, or zero if nothing has been learned there.
    pub fn bias_estimate(&self, place_id: PlaceId, context_id: ContextId) -> Vec<f64> {
        self.records
            .get(&(place_id, context_id))
            .map(|r| r.bias_estimate.clone())
            .unwrap_or_else(|| zeros(self.dimensions))
    }

    /// Drop records with fewer than `min_visits` visits or not visited
    /// within `max_age` seconds of `now`. Returns how many were removed.
    pub fn prune(&mut self, min_visits: u64, max_age: f64, now: f64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| r.visit_count >= min_visits && now - r.last_visit_time <= max_age);
        let removed = before - self.records.len();
        if removed > 0 {
            log::debug!("pruned {} context records", removed);
        }
        removed
    }

    pub fn stats(&self) -> ContextStats {
        let num_contexts = self.records.len();
        let total_visits: u64 = self.records.values().map(|r| r.visit_count).sum();
        ContextStats {
            num_contexts,
            total_visits,
            avg_visits_per_context: if num_contexts > 0 {
                total_visits as f64 / num_contexts as f64
            } else {
                0.0
            },
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
