//! # Field Zones
//!
//! Batch spatial analysis turning an equipment's raw GPS fixes into a
//! durable record of where work was actually done.
//!
//! The pipeline runs strictly downward over one equipment's history:
//! - group fixes by calendar date,
//! - find each day's dense "worked" fix groups with DBSCAN,
//! - wrap every group in a concave hull (alpha shape) and keep the parts
//!   above a minimum surface,
//! - merge all daily polygons into a disjoint partition where every cell
//!   knows the distinct dates it was covered on,
//! - rebuild the transit paths between worked zones, clipped to the zone
//!   boundaries,
//! - derive the equipment-level surface and distance metrics.
//!
//! Everything is pure, synchronous, in-memory computation; reading fixes
//! and writing the resulting records belongs to the caller.
//!
//! ## Features
//!
//! - **`serde`** - Serialize/Deserialize on boundary records and metrics
//! - **`parallel`** - analyze many equipment histories with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use field_zones::{analyze_positions, AnalysisConfig, Position};
//!
//! // A morning of work: a 5x5 lawn of fixes roughly 11 m apart
//! let start = NaiveDate::from_ymd_opt(2023, 6, 1)
//!     .unwrap()
//!     .and_hms_opt(8, 0, 0)
//!     .unwrap();
//! let mut positions = Vec::new();
//! for i in 0..5 {
//!     for j in 0..5 {
//!         positions.push(Position::new(
//!             46.8100 + i as f64 * 0.0001,
//!             -71.2000 + j as f64 * 0.0001,
//!             start + chrono::Duration::seconds((i * 5 + j) as i64 * 30),
//!         ));
//!     }
//! }
//!
//! let report = analyze_positions(&positions, &AnalysisConfig::default());
//! assert_eq!(report.partition.len(), 1);
//! assert!(report.metrics.total_hectares > 0.1);
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use geo::Polygon;
use log::{debug, info};

pub mod aggregate;
pub mod cache;
pub mod clustering;
pub mod metrics;
pub mod projection;
pub mod records;
pub mod shape;
pub mod track;

pub use aggregate::{aggregate_zones, filter_window, ZoneCell, AREA_TOLERANCE_M2};
pub use cache::AggregationCache;
pub use clustering::{cluster_day, group_by_day, DayClusters, MIN_SAMPLES};
pub use metrics::{compute_metrics, distance_between_zones, EquipmentMetrics};
pub use records::{RecordError, TrackRecord, ZoneRecord};
pub use shape::{alpha_shape, extract_daily_clusters, HullShape};
pub use track::{reconstruct_tracks, Track};

// ============================================================================
// Core Types
// ============================================================================

/// Identifier of a tracked equipment, assigned by the surrounding system.
pub type EquipmentId = i64;

/// A single GPS fix in WGS84 degrees with a UTC-naive timestamp.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use field_zones::Position;
/// let ts = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let fix = Position::new(46.8139, -71.2082, ts); // Quebec City
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: NaiveDateTime,
}

impl Position {
    /// Create a new position fix.
    pub fn new(latitude: f64, longitude: f64, timestamp: NaiveDateTime) -> Self {
        Self { latitude, longitude, timestamp }
    }

    /// Check that the coordinates are finite and within WGS84 bounds.
    ///
    /// The ingestion layer filters malformed fixes before they reach this
    /// crate; this check exists for callers that want to enforce that.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// One day's worked polygon in projected meters, before aggregation.
#[derive(Debug, Clone)]
pub struct DailyCluster {
    pub date: NaiveDate,
    pub geometry: Polygon<f64>,
    /// Number of fixes in the dense group this polygon came from.
    pub point_count: usize,
}

/// Tuning parameters of the analysis pipeline.
///
/// All three values must be positive; validation belongs to whoever owns
/// the configuration surface.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisConfig {
    /// DBSCAN neighborhood radius in projected meters.
    /// Default: 25.0
    pub eps_meters: f64,

    /// Minimum worked surface in hectares; smaller hull parts are dropped.
    /// Default: 0.1 (1,000 m²)
    pub min_surface_ha: f64,

    /// Concavity of the hull extraction; triangles with a circumradius
    /// above `1 / alpha` meters are cut away. Default: 0.02
    pub alpha: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            eps_meters: 25.0,
            min_surface_ha: 0.1,
            alpha: 0.02,
        }
    }
}

/// Optional date bounds applied before aggregation, and the unit of cache
/// segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AnalysisWindow {
    /// First included date.
    pub start: Option<NaiveDate>,
    /// Last included date.
    pub end: Option<NaiveDate>,
}

impl AnalysisWindow {
    /// The unbounded window: every date qualifies.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Whole calendar year. `None` for an out-of-range year.
    pub fn year(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
        Some(Self { start: Some(start), end: Some(end) })
    }

    /// Whole calendar month. `None` for an invalid year/month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year, 12, 31)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?
        };
        Some(Self { start: Some(start), end: Some(end) })
    }

    /// Single calendar day. `None` for an invalid date.
    pub fn day(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some(Self { start: Some(date), end: Some(date) })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Everything one batch pass produces.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Per-day worked polygons, before cross-date aggregation.
    pub daily_clusters: Vec<DailyCluster>,
    /// Disjoint partition of all worked ground, with per-cell date sets.
    pub partition: Vec<ZoneCell>,
    /// Reconstructed transit segments.
    pub tracks: Vec<Track>,
    pub metrics: EquipmentMetrics,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run the full batch analysis over one equipment's position history.
///
/// Fixes may arrive in any order; days with fewer than [`MIN_SAMPLES`]
/// fixes, dense groups whose hull degenerates and hull parts below the
/// minimum surface all silently contribute nothing.
pub fn analyze_positions(positions: &[Position], config: &AnalysisConfig) -> AnalysisReport {
    debug_assert!(
        config.eps_meters > 0.0 && config.min_surface_ha > 0.0 && config.alpha > 0.0,
        "analysis parameters must be positive"
    );

    let (daily_clusters, tracks) = day_pass(positions, config);

    let inputs: Vec<ZoneCell> = daily_clusters
        .iter()
        .map(|cluster| ZoneCell::daily(cluster.date, cluster.geometry.clone()))
        .collect();
    let partition = aggregate_zones(&inputs);
    let metrics = compute_metrics(&partition, &daily_clusters);

    info!(
        "analyzed {} fixes: {} daily zones, {} cells, {} tracks, {:.2} ha",
        positions.len(),
        daily_clusters.len(),
        partition.len(),
        tracks.len(),
        metrics.total_hectares,
    );

    AnalysisReport { daily_clusters, partition, tracks, metrics }
}

/// The per-day stage alone: worked polygons for each date, without the
/// cross-date aggregation. Useful for callers that persist daily zones and
/// aggregate at read time.
pub fn daily_worked_polygons(
    positions: &[Position],
    config: &AnalysisConfig,
) -> Vec<DailyCluster> {
    day_pass(positions, config).0
}

/// Cluster, extract and track every day of the history.
fn day_pass(positions: &[Position], config: &AnalysisConfig) -> (Vec<DailyCluster>, Vec<Track>) {
    let mut daily_clusters: Vec<DailyCluster> = Vec::new();
    let mut tracks: Vec<Track> = Vec::new();

    for (date, indices) in group_by_day(positions) {
        let Some(day) = cluster_day(positions, date, &indices, config.eps_meters) else {
            debug!("{date}: {} fixes, below minimum, skipped", indices.len());
            continue;
        };

        let worked = extract_daily_clusters(&day, config);
        debug!(
            "{date}: {} groups -> {} worked polygons, {} transit fixes",
            day.clusters.len(),
            worked.len(),
            day.noise.len()
        );

        let day_polygons: Vec<Polygon<f64>> =
            worked.iter().map(|cluster| cluster.geometry.clone()).collect();
        tracks.extend(reconstruct_tracks(&day, &day_polygons));
        daily_clusters.extend(worked);
    }

    (daily_clusters, tracks)
}

/// Analyze several equipment histories concurrently.
///
/// Histories share no mutable state, so this is a plain rayon map; the
/// output order matches the input order.
#[cfg(feature = "parallel")]
pub fn analyze_fleet(
    fleet: &[(EquipmentId, Vec<Position>)],
    config: &AnalysisConfig,
) -> Vec<(EquipmentId, AnalysisReport)> {
    use rayon::prelude::*;

    fleet
        .par_iter()
        .map(|(equipment, positions)| (*equipment, analyze_positions(positions, config)))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
