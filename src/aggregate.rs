//! # Overlap Aggregation
//!
//! Merges dated worked polygons into a minimal disjoint partition. Each
//! resulting [`ZoneCell`] is covered on exactly the dates in its date set,
//! so a region worked on three different days ends up as one cell with a
//! pass count of three, while the surrounding single-pass ground keeps a
//! pass count of one.
//!
//! The partition is built as a pure fold: every step takes the current cell
//! list plus one incoming dated polygon and produces a fresh list, splitting
//! existing cells into their re-covered and untouched parts with geometric
//! intersection/difference. No cell is mutated in place, which keeps the
//! fold free of aliasing and makes order-invariance directly testable.
//! Boolean overlay leaves float-sized slivers behind; anything below
//! [`AREA_TOLERANCE_M2`] counts as empty.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use geo::{Area, BooleanOps, Centroid, InteriorPoint, MultiPolygon, Point, Polygon};

use crate::AnalysisWindow;

/// Overlay results below this area (in m²) are treated as empty.
pub const AREA_TOLERANCE_M2: f64 = 1e-6;

/// One disjoint cell of the aggregated partition, in projected meters.
#[derive(Debug, Clone)]
pub struct ZoneCell {
    pub geometry: MultiPolygon<f64>,
    /// Distinct dates on which this ground was covered.
    pub dates: BTreeSet<NaiveDate>,
}

impl ZoneCell {
    pub fn new(geometry: MultiPolygon<f64>, dates: BTreeSet<NaiveDate>) -> Self {
        Self { geometry, dates }
    }

    /// Cell for a single day's worked polygon, the usual aggregation input.
    pub fn daily(date: NaiveDate, polygon: Polygon<f64>) -> Self {
        Self {
            geometry: MultiPolygon::new(vec![polygon]),
            dates: BTreeSet::from([date]),
        }
    }

    /// Number of distinct dates on which this cell was covered.
    pub fn pass_count(&self) -> u32 {
        self.dates.len() as u32
    }

    /// Covered surface in hectares.
    pub fn surface_ha(&self) -> f64 {
        self.geometry.unsigned_area() / 10_000.0
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        self.geometry.centroid()
    }

    /// A point guaranteed to lie inside the cell. Unlike the centroid, this
    /// stays inside concave cells, which overlay splitting produces all the
    /// time.
    pub fn representative_point(&self) -> Option<Point<f64>> {
        self.geometry.interior_point()
    }
}

/// Aggregate dated polygons into a disjoint partition.
///
/// The output cells are pairwise non-overlapping, their union equals the
/// union of the inputs (up to float tolerance), and each cell's date set is
/// the union of the date sets of every input covering it. Feeding the
/// result back in reproduces it, and input order only affects internal cell
/// ordering, never the resulting geometry/date pairs.
pub fn aggregate_zones(inputs: &[ZoneCell]) -> Vec<ZoneCell> {
    let cells = inputs.iter().fold(Vec::new(), fold_zone);

    debug_assert!(
        area_conserved(inputs, &cells),
        "partition area diverged from input union area"
    );

    cells
}

/// Keep only the inputs touching the given window, ahead of aggregation.
pub fn filter_window(inputs: &[ZoneCell], window: AnalysisWindow) -> Vec<ZoneCell> {
    inputs
        .iter()
        .filter(|cell| cell.dates.iter().any(|&date| window.contains(date)))
        .cloned()
        .collect()
}

/// One fold step: split every existing cell against the incoming polygon,
/// then add whatever part of the incoming polygon no existing cell covered.
fn fold_zone(current: Vec<ZoneCell>, incoming: &ZoneCell) -> Vec<ZoneCell> {
    let mut next = Vec::with_capacity(current.len() + 1);
    let mut remaining = incoming.geometry.clone();

    for cell in &current {
        let untouched = cell.geometry.difference(&remaining);
        let recovered = cell.geometry.intersection(&remaining);

        if !is_negligible(&untouched) {
            next.push(ZoneCell::new(untouched, cell.dates.clone()));
        }
        if !is_negligible(&recovered) {
            let mut dates = cell.dates.clone();
            dates.extend(incoming.dates.iter().copied());
            next.push(ZoneCell::new(recovered, dates));
            // Cells are disjoint, so only the still-uncovered part of the
            // incoming polygon can match the cells that follow
            remaining = remaining.difference(&cell.geometry);
        }
    }

    if !is_negligible(&remaining) {
        next.push(ZoneCell::new(remaining, incoming.dates.clone()));
    }

    next
}

fn is_negligible(geometry: &MultiPolygon<f64>) -> bool {
    geometry.unsigned_area() < AREA_TOLERANCE_M2
}

/// Union of all cell geometries.
pub(crate) fn union_all<'a, I>(geometries: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    geometries
        .into_iter()
        .fold(None, |acc: Option<MultiPolygon<f64>>, geometry| {
            Some(match acc {
                Some(acc) => acc.union(geometry),
                None => geometry.clone(),
            })
        })
        .unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// True when the partition covers exactly the input union, within a
/// relative float tolerance. Quadratic; used by debug assertions and tests.
pub(crate) fn area_conserved(inputs: &[ZoneCell], cells: &[ZoneCell]) -> bool {
    let input_area = union_all(inputs.iter().map(|c| &c.geometry)).unsigned_area();
    let cell_area: f64 = cells.iter().map(|c| c.geometry.unsigned_area()).sum();
    (input_area - cell_area).abs() <= 1e-6 * input_area.max(1.0)
}
