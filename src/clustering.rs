//! # Day Grouping and Density Clustering
//!
//! Splits an equipment's position history by calendar date, then separates
//! each day's fixes into dense "worked" groups and sparse transit noise with
//! a DBSCAN pass over projected coordinates. Neighborhood lookups go through
//! an R-tree so a day with thousands of fixes stays cheap.
//!
//! Days with fewer than [`MIN_SAMPLES`] fixes are skipped entirely: they can
//! neither form a cluster nor a meaningful worked polygon.

use std::collections::{BTreeMap, VecDeque};

use chrono::{NaiveDate, NaiveDateTime};
use geo::Coord;
use rstar::{primitives::GeomWithData, RTree};

use crate::projection::to_mercator;
use crate::Position;

/// Minimum fixes in an eps-neighborhood (the queried fix included) for a fix
/// to count as a cluster core, and minimum fixes for a day to be analyzed.
pub const MIN_SAMPLES: usize = 3;

// DBSCAN label states
const UNVISITED: i32 = -1;
const NOISE: i32 = -2;

/// A single GPS fix in projected meters, tied back to its source position.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedFix {
    /// Index of the source fix in the position slice handed to the pipeline.
    pub position: usize,
    /// Web Mercator coordinate in meters.
    pub coord: Coord<f64>,
    pub timestamp: NaiveDateTime,
}

/// One day's fixes split into dense groups and time-ordered transit noise.
#[derive(Debug, Clone)]
pub struct DayClusters {
    pub date: NaiveDate,
    /// Dense groups, each with at least [`MIN_SAMPLES`] members.
    pub clusters: Vec<Vec<ProjectedFix>>,
    /// Fixes outside every dense group, sorted by timestamp. Kept for track
    /// reconstruction.
    pub noise: Vec<ProjectedFix>,
}

/// Group positions by the UTC-naive calendar date of their timestamp.
///
/// Returns indices into `positions` so later stages can tag the source
/// fixes. The map is ordered, which keeps the whole pipeline deterministic.
pub fn group_by_day(positions: &[Position]) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (index, position) in positions.iter().enumerate() {
        days.entry(position.timestamp.date()).or_default().push(index);
    }
    days
}

/// Cluster one day's fixes with DBSCAN (`eps_meters` radius, minimum
/// neighborhood size [`MIN_SAMPLES`]).
///
/// Returns `None` when the day has fewer than [`MIN_SAMPLES`] fixes.
/// Duplicate coordinates are fine: three identical fixes form a zero-radius
/// neighborhood of size three and still cluster.
pub fn cluster_day(
    positions: &[Position],
    date: NaiveDate,
    indices: &[usize],
    eps_meters: f64,
) -> Option<DayClusters> {
    if indices.len() < MIN_SAMPLES {
        return None;
    }

    let fixes: Vec<ProjectedFix> = indices
        .iter()
        .map(|&index| {
            let p = &positions[index];
            ProjectedFix {
                position: index,
                coord: to_mercator(Coord { x: p.longitude, y: p.latitude }),
                timestamp: p.timestamp,
            }
        })
        .collect();

    let labels = dbscan(&fixes, eps_meters);

    let cluster_count = labels.iter().copied().max().unwrap_or(NOISE) + 1;
    let mut clusters: Vec<Vec<ProjectedFix>> = vec![Vec::new(); cluster_count.max(0) as usize];
    let mut noise: Vec<ProjectedFix> = Vec::new();

    for (fix, &label) in fixes.iter().zip(&labels) {
        if label >= 0 {
            clusters[label as usize].push(*fix);
        } else {
            noise.push(*fix);
        }
    }
    noise.sort_by_key(|fix| fix.timestamp);

    Some(DayClusters { date, clusters, noise })
}

/// Label-array DBSCAN. Returns one label per fix: `>= 0` is a cluster id,
/// [`NOISE`] marks fixes without a dense neighborhood.
fn dbscan(fixes: &[ProjectedFix], eps_meters: f64) -> Vec<i32> {
    let entries: Vec<GeomWithData<[f64; 2], usize>> = fixes
        .iter()
        .enumerate()
        .map(|(i, fix)| GeomWithData::new([fix.coord.x, fix.coord.y], i))
        .collect();
    let tree = RTree::bulk_load(entries);
    let eps_squared = eps_meters * eps_meters;

    let neighbors = |i: usize| -> Vec<usize> {
        tree.locate_within_distance([fixes[i].coord.x, fixes[i].coord.y], eps_squared)
            .map(|entry| entry.data)
            .collect()
    };

    let mut labels = vec![UNVISITED; fixes.len()];
    let mut cluster_id: i32 = 0;

    for i in 0..fixes.len() {
        if labels[i] != UNVISITED {
            continue;
        }

        let seeds = neighbors(i);
        if seeds.len() < MIN_SAMPLES {
            labels[i] = NOISE;
            continue;
        }

        labels[i] = cluster_id;
        let mut queue: VecDeque<usize> = seeds.into();
        while let Some(j) = queue.pop_front() {
            if labels[j] == NOISE {
                // Border fix: reachable from a core fix, joins the cluster
                labels[j] = cluster_id;
            }
            if labels[j] != UNVISITED {
                continue;
            }
            labels[j] = cluster_id;

            let reachable = neighbors(j);
            if reachable.len() >= MIN_SAMPLES {
                queue.extend(reachable);
            }
        }
        cluster_id += 1;
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64, day: u32, second: u32) -> Position {
        Position {
            latitude: lat,
            longitude: lon,
            timestamp: NaiveDate::from_ymd_opt(2023, 6, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
                + chrono::Duration::seconds(second as i64),
        }
    }

    // ~1.11 m of latitude at the equator
    const TEN_METERS_DEG: f64 = 0.00009;

    #[test]
    fn test_group_by_day() {
        let positions = vec![pos(0.0, 0.0, 1, 0), pos(0.0, 0.0, 2, 0), pos(0.0, 0.0, 1, 30)];
        let days = group_by_day(&positions);
        assert_eq!(days.len(), 2);
        assert_eq!(days[&NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()], vec![0, 2]);
    }

    #[test]
    fn test_day_below_minimum_is_skipped() {
        let positions = vec![pos(0.0, 0.0, 1, 0), pos(0.0, 0.0, 1, 10)];
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert!(cluster_day(&positions, date, &[0, 1], 25.0).is_none());
    }

    #[test]
    fn test_two_groups_and_noise() {
        let mut positions = Vec::new();
        // Dense group A: 4 fixes ~10 m apart
        for i in 0..4 {
            positions.push(pos(i as f64 * TEN_METERS_DEG, 0.0, 1, i));
        }
        // Dense group B: 4 fixes ~10 m apart, ~1 km east
        for i in 0..4 {
            positions.push(pos(i as f64 * TEN_METERS_DEG, 0.01, 1, 100 + i));
        }
        // One isolated fix halfway between
        positions.push(pos(0.0, 0.005, 1, 50));

        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let indices: Vec<usize> = (0..positions.len()).collect();
        let day = cluster_day(&positions, date, &indices, 25.0).unwrap();

        assert_eq!(day.clusters.len(), 2);
        assert!(day.clusters.iter().all(|c| c.len() == 4));
        assert_eq!(day.noise.len(), 1);
        assert_eq!(day.noise[0].position, 8);
    }

    #[test]
    fn test_duplicate_fixes_still_cluster() {
        let positions = vec![pos(0.0, 0.0, 1, 0), pos(0.0, 0.0, 1, 1), pos(0.0, 0.0, 1, 2)];
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let day = cluster_day(&positions, date, &[0, 1, 2], 25.0).unwrap();
        assert_eq!(day.clusters.len(), 1);
        assert_eq!(day.clusters[0].len(), 3);
        assert!(day.noise.is_empty());
    }

    #[test]
    fn test_noise_is_time_ordered() {
        // Three isolated fixes inserted out of order
        let positions = vec![
            pos(0.0, 0.02, 1, 30),
            pos(0.0, 0.0, 1, 10),
            pos(0.0, 0.04, 1, 20),
        ];
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let day = cluster_day(&positions, date, &[0, 1, 2], 25.0).unwrap();
        assert!(day.clusters.is_empty());
        let seconds: Vec<u32> = day
            .noise
            .iter()
            .map(|f| chrono::Timelike::second(&f.timestamp.time()))
            .collect();
        assert_eq!(seconds, vec![10, 20, 30]);
    }
}
