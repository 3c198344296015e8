use std::collections::BTreeMap;

use crate::gene::Gene;

#[derive(Debug)]
struct Slot {
    feature: Gene,
    /// Sub-pixel features and statistic blocks may absorb later candidates;
    /// individually visible features never do.
    foldable: bool,
}

/// Ordered multiset of output features keyed by start, folding sub-pixel
/// features that share a pixel into statistic blocks.
///
/// Candidates must be offered in non-decreasing start order for the fold
/// to be a single left-to-right pass.
///
/// # Example
///
/// ```
/// use genetrack::{gene::Gene, linkage::Linkage, record::FeatureRecord, statistic::StatisticAggregator};
///
/// let feature = |start: u64| {
///     let line = format!("c\ts\tregion\t{}\t{}\t.\t+\t.\tID=r{}", start + 1, start + 5, start);
///     Gene::from_record(FeatureRecord::parse(&line, 1, Linkage::ById).unwrap())
/// };
///
/// let mut aggregator = StatisticAggregator::new(0.01);
/// for start in [0, 10, 20] {
///     aggregator.offer(feature(start));
/// }
/// let out = aggregator.into_sorted();
/// assert_eq!(out.len(), 1);
/// assert_eq!(out[0].feature_count, 3);
/// ```
#[derive(Debug)]
pub struct StatisticAggregator {
    scale_factor: f64,
    step: u64,
    slots: BTreeMap<u64, Vec<Slot>>,
}

impl StatisticAggregator {
    /// Creates an aggregator for `scale_factor` pixels per base pair.
    pub fn new(scale_factor: f64) -> Self {
        let step = (1.0 / scale_factor).ceil().max(1.0) as u64;
        Self {
            scale_factor,
            step,
            slots: BTreeMap::new(),
        }
    }

    /// Width of one pixel in base pairs.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Keeps `feature` as an individual, non-foldable element.
    pub fn insert_visible(&mut self, feature: Gene) {
        self.insert(feature, false);
    }

    /// Offers a feature for output.
    ///
    /// Visible features are kept individually. A sub-pixel feature is folded
    /// into the nearest foldable element starting at or before it when both
    /// end in the same pixel, and kept as a new foldable element otherwise.
    pub fn offer(&mut self, feature: Gene) {
        if feature.passes_scale(self.scale_factor) {
            self.insert_visible(feature);
            return;
        }

        let step = self.step;
        let bucket = feature.end / step;
        if let Some(floor) = self.floor_foldable_mut(feature.start) {
            if floor.end / step == bucket {
                floor.absorb_statistic(&feature);
                return;
            }
        }
        self.insert(feature, true);
    }

    /// Number of kept elements.
    pub fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    /// Returns true if nothing was kept.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns every kept element in non-decreasing start order.
    pub fn into_sorted(self) -> Vec<Gene> {
        self.slots
            .into_values()
            .flatten()
            .map(|slot| slot.feature)
            .collect()
    }

    fn insert(&mut self, feature: Gene, foldable: bool) {
        self.slots
            .entry(feature.start)
            .or_default()
            .push(Slot { feature, foldable });
    }

    fn floor_foldable_mut(&mut self, start: u64) -> Option<&mut Gene> {
        self.slots
            .range_mut(..=start)
            .rev()
            .find_map(|(_, slots)| slots.iter_mut().rev().find(|slot| slot.foldable))
            .map(|slot| &mut slot.feature)
    }
}
