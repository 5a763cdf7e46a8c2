use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::commons::basic_functions::{m2_to_km2, percent_of};
use crate::error::{DashResult, DashboardError};
use crate::geometric::land_cover::ClassCode;

/// Raw area sum of one class, as produced by the zonal statistics engine.
/// Wire form: `{"class": 10, "sum": 5000000.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaAggregate {
    #[serde(rename = "class")]
    pub code: ClassCode,
    /// Area in m²
    #[serde(rename = "sum")]
    pub raw_sum: f64,
}

impl AreaAggregate {
    pub fn new(code: u16, raw_sum: f64) -> Self {
        AreaAggregate {
            code: ClassCode(code),
            raw_sum,
        }
    }
}

/// The set of aggregates for one region (the `groups` array on the wire)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupResult(pub Vec<AreaAggregate>);

impl GroupResult {
    pub fn new(aggregates: Vec<AreaAggregate>) -> Self {
        GroupResult(aggregates)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AreaAggregate> {
        self.0.iter()
    }
}

impl FromIterator<AreaAggregate> for GroupResult {
    fn from_iter<I: IntoIterator<Item = AreaAggregate>>(iter: I) -> Self {
        GroupResult(iter.into_iter().collect())
    }
}

/// Area and share of one class, derived from its aggregate and the region total
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedStat {
    pub code: ClassCode,
    pub area_km2: f64,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreStatus {
    /// Nothing loaded yet
    NotLoaded,
    Ready,
    /// Explicit marker: data exists or was requested but cannot be displayed
    Unavailable(String),
}

/// Per-session holder of the current region's aggregates and derived stats
#[derive(Debug, Clone)]
pub struct StatsStore {
    aggregates: BTreeMap<ClassCode, f64>,
    derived: BTreeMap<ClassCode, DerivedStat>,
    total_area: f64,
    status: StoreStatus,
}

impl StatsStore {
    pub fn new() -> Self {
        StatsStore {
            aggregates: BTreeMap::new(),
            derived: BTreeMap::new(),
            total_area: 0.0,
            status: StoreStatus::NotLoaded,
        }
    }

    /// Replace the current aggregates and recompute the derived table.
    ///
    /// Duplicate class records are merged by summing. An empty group result or
    /// a zero total fails with `EmptyData`; the aggregates are still kept (with
    /// every percentage at 0) but the store reports itself unavailable.
    /// Negative or non-finite sums fail with `InvalidAggregate` and clear the
    /// store.
    pub fn load(&mut self, group_result: &GroupResult) -> DashResult<()> {
        if let Some(bad) = group_result
            .iter()
            .find(|a| !a.raw_sum.is_finite() || a.raw_sum < 0.0)
        {
            let err = DashboardError::InvalidAggregate {
                code: bad.code,
                sum: bad.raw_sum,
            };
            self.mark_unavailable(err.to_string());
            return Err(err);
        }

        let mut aggregates: BTreeMap<ClassCode, f64> = BTreeMap::new();
        for aggregate in group_result.iter() {
            if aggregates.contains_key(&aggregate.code) {
                tracing::debug!(code = %aggregate.code, "merging duplicate class record");
            }
            *aggregates.entry(aggregate.code).or_insert(0.0) += aggregate.raw_sum;
        }

        self.total_area = aggregates.values().sum();
        self.aggregates = aggregates;
        self.derived = self
            .aggregates
            .iter()
            .map(|(&code, &raw_sum)| {
                let stat = DerivedStat {
                    code,
                    area_km2: m2_to_km2(raw_sum),
                    percent_of_total: percent_of(raw_sum, self.total_area),
                };
                (code, stat)
            })
            .collect();

        if self.aggregates.is_empty() || self.total_area <= 0.0 {
            self.status = StoreStatus::Unavailable(DashboardError::EmptyData.to_string());
            tracing::warn!(
                classes = self.aggregates.len(),
                "group result has no usable area"
            );
            return Err(DashboardError::EmptyData);
        }

        self.status = StoreStatus::Ready;
        tracing::debug!(
            classes = self.aggregates.len(),
            total_area_m2 = self.total_area,
            "statistics loaded"
        );
        Ok(())
    }

    /// Drop all aggregates and enter the unavailable state (source failures)
    pub fn mark_unavailable(&mut self, reason: impl Into<String>) {
        self.aggregates.clear();
        self.derived.clear();
        self.total_area = 0.0;
        self.status = StoreStatus::Unavailable(reason.into());
    }

    /// Derived stats by code, ascending
    pub fn derived(&self) -> &BTreeMap<ClassCode, DerivedStat> {
        &self.derived
    }

    /// `None` when the code is absent from the current aggregates
    pub fn stat_for(&self, code: ClassCode) -> Option<DerivedStat> {
        self.derived.get(&code).copied()
    }

    pub fn is_available(&self) -> bool {
        self.status == StoreStatus::Ready
    }

    pub fn status(&self) -> &StoreStatus {
        &self.status
    }

    /// Total area in m²
    pub fn total_area(&self) -> f64 {
        self.total_area
    }

    pub fn total_area_km2(&self) -> f64 {
        m2_to_km2(self.total_area)
    }

    /// Current (merged) aggregates, for export
    pub fn group_result(&self) -> GroupResult {
        self.aggregates
            .iter()
            .map(|(&code, &raw_sum)| AreaAggregate { code, raw_sum })
            .collect()
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        StatsStore::new()
    }
}
