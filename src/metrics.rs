//! # Equipment Metrics
//!
//! Scalar summaries recomputed from a freshly aggregated partition, never
//! patched incrementally. Areas come out of the projected plane, so they
//! carry the same Mercator scale as the zone polygons themselves.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use geo::{BooleanOps, Centroid, Distance, Euclidean, MultiPolygon, Point};

use crate::aggregate::ZoneCell;
use crate::DailyCluster;

/// Worked-surface summary for one equipment.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EquipmentMetrics {
    /// Surface of the aggregated partition, in hectares.
    pub total_hectares: f64,
    /// Surface discounted by how often each cell was passed over: a cell
    /// worked on n distinct days contributes 1/n of its area.
    pub relative_hectares: f64,
    /// Sum of centroid-to-centroid distances between consecutive daily
    /// zones, in meters. A proxy for transit effort between work days.
    pub distance_between_zones: f64,
}

/// Compute all equipment metrics in one pass.
///
/// `partition` is the aggregated cell list; `daily` the per-day worked
/// polygons the partition was built from (used for the day-to-day centroid
/// chain).
pub fn compute_metrics(partition: &[ZoneCell], daily: &[DailyCluster]) -> EquipmentMetrics {
    let total_hectares: f64 = partition.iter().map(ZoneCell::surface_ha).sum();
    let relative_hectares: f64 = partition
        .iter()
        .map(|cell| cell.surface_ha() / f64::from(cell.pass_count().max(1)))
        .sum();

    EquipmentMetrics {
        total_hectares,
        relative_hectares,
        distance_between_zones: distance_between_zones(daily),
    }
}

/// Distance of the day-to-day centroid chain: union each date's polygons,
/// take the centroid, and sum the straight-line distances between
/// consecutive dates.
pub fn distance_between_zones(daily: &[DailyCluster]) -> f64 {
    let mut by_date: BTreeMap<NaiveDate, MultiPolygon<f64>> = BTreeMap::new();
    for cluster in daily {
        let part = MultiPolygon::new(vec![cluster.geometry.clone()]);
        by_date
            .entry(cluster.date)
            .and_modify(|union| *union = union.union(&part))
            .or_insert(part);
    }

    let centroids: Vec<Point<f64>> = by_date.values().filter_map(Centroid::centroid).collect();
    centroids
        .windows(2)
        .map(|pair| Euclidean::distance(pair[0], pair[1]))
        .sum()
}
