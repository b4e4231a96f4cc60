//! # Transit Track Reconstruction
//!
//! Rebuilds the travel polylines between worked areas from a day's noise
//! fixes. Consecutive transit fixes more than [`MAX_GAP_SECONDS`] apart
//! belong to different trips, so a day can produce several tracks; a
//! segment needs at least two fixes to become one.
//!
//! When a transit segment starts or ends right after/before a clustered
//! fix, the machine was leaving or entering a worked zone. The polyline is
//! then extended along the straight line toward that clustered fix and cut
//! exactly where it crosses the zone boundary, so tracks visually attach to
//! the zones instead of stopping at the nearest raw GPS fix. If the
//! clustered fix is not inside any accepted zone polygon (its cluster was
//! filtered out), the raw fix is used as the endpoint instead.

use chrono::NaiveDateTime;
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Contains, Coord, Line, LineString, Point, Polygon};

use crate::clustering::{DayClusters, ProjectedFix};

/// Transit fixes further apart than this start a new track.
const MAX_GAP_SECONDS: i64 = 600;

/// One reconstructed transit segment, in projected meters.
#[derive(Debug, Clone)]
pub struct Track {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub line: LineString<f64>,
    /// Indices (into the pipeline's position slice) of the fixes consumed
    /// by this track, so the caller can tag them.
    pub position_indices: Vec<usize>,
}

/// Rebuild the transit tracks of one day.
///
/// `day_polygons` are the day's accepted worked polygons, used for boundary
/// clipping. Days with fewer than two transit fixes yield nothing.
pub fn reconstruct_tracks(day: &DayClusters, day_polygons: &[Polygon<f64>]) -> Vec<Track> {
    if day.noise.len() < 2 {
        return vec![];
    }

    // Clustered fixes ordered by time, for locating the worked fix adjacent
    // to each transit segment
    let mut clustered: Vec<ProjectedFix> = day.clusters.iter().flatten().copied().collect();
    clustered.sort_by_key(|fix| fix.timestamp);

    let mut tracks = Vec::new();
    for segment in split_on_gaps(&day.noise) {
        if segment.len() < 2 {
            continue;
        }

        let mut coords: Vec<(Coord<f64>, NaiveDateTime)> = Vec::with_capacity(segment.len() + 2);

        let before = clustered
            .iter()
            .rev()
            .find(|fix| fix.timestamp < segment[0].timestamp);
        if let Some(worked) = before {
            let endpoint = boundary_intersection(worked.coord, segment[0].coord, day_polygons)
                .unwrap_or(worked.coord);
            coords.push((endpoint, worked.timestamp));
        }

        coords.extend(segment.iter().map(|fix| (fix.coord, fix.timestamp)));

        let after = clustered
            .iter()
            .find(|fix| fix.timestamp > segment[segment.len() - 1].timestamp);
        if let Some(worked) = after {
            let endpoint =
                boundary_intersection(worked.coord, segment[segment.len() - 1].coord, day_polygons)
                    .unwrap_or(worked.coord);
            coords.push((endpoint, worked.timestamp));
        }

        tracks.push(Track {
            start_time: coords[0].1,
            end_time: coords[coords.len() - 1].1,
            line: LineString::from(coords.iter().map(|(c, _)| *c).collect::<Vec<_>>()),
            position_indices: segment.iter().map(|fix| fix.position).collect(),
        });
    }

    tracks
}

/// Split time-ordered transit fixes into segments at gaps longer than
/// [`MAX_GAP_SECONDS`].
fn split_on_gaps(noise: &[ProjectedFix]) -> Vec<Vec<ProjectedFix>> {
    let mut segments: Vec<Vec<ProjectedFix>> = Vec::new();
    let mut current: Vec<ProjectedFix> = Vec::new();

    for &fix in noise {
        if let Some(previous) = current.last() {
            let gap = (fix.timestamp - previous.timestamp).num_seconds();
            if gap > MAX_GAP_SECONDS {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.push(fix);
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Where the straight segment from `inner` (inside one of the polygons) to
/// `outer` crosses that polygon's boundary. When the segment crosses the
/// boundary more than once, the crossing nearest `inner` is the point where
/// the machine left the zone. Returns `None` if `inner` is in no polygon or
/// the segment never reaches the boundary.
pub(crate) fn boundary_intersection(
    inner: Coord<f64>,
    outer: Coord<f64>,
    polygons: &[Polygon<f64>],
) -> Option<Coord<f64>> {
    let probe = Point::from(inner);
    let segment = Line::new(inner, outer);

    for polygon in polygons {
        if !polygon.contains(&probe) {
            continue;
        }

        let mut nearest: Option<(f64, Coord<f64>)> = None;
        for edge in polygon.exterior().lines() {
            if let Some(LineIntersection::SinglePoint { intersection, .. }) =
                line_intersection(segment, edge)
            {
                let dx = intersection.x - inner.x;
                let dy = intersection.y - inner.y;
                let distance_squared = dx * dx + dy * dy;
                if nearest.map_or(true, |(best, _)| distance_squared < best) {
                    nearest = Some((distance_squared, intersection));
                }
            }
        }
        return nearest.map(|(_, coord)| coord);
    }

    None
}
