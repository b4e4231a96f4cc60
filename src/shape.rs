//! # Concave Hull Extraction
//!
//! Turns a dense fix group into the polygon of ground it covered, using an
//! alpha shape: Delaunay-triangulate the points, keep the triangles whose
//! circumradius is below `1 / alpha`, and union what remains. Smaller alpha
//! values keep larger triangles and produce looser hulls; larger values
//! hug the points more tightly and can split the hull into several parts.
//!
//! Every input point receives a bounded, deterministically seeded jitter
//! first. Field equipment parked on one spot produces exactly coincident or
//! collinear fixes, and without the jitter those make the triangulation
//! degenerate. Re-running the pipeline over unchanged data reproduces the
//! same jitter, so results are stable across runs.
//!
//! The outcome is a closed [`HullShape`] variant handled exhaustively by
//! [`extract_daily_clusters`]: only polygonal shapes above the minimum
//! surface survive, everything else is silently dropped.

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Point, Polygon};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::clustering::DayClusters;
use crate::{AnalysisConfig, DailyCluster};

/// Jitter amplitude in projected meters.
const JITTER: f64 = 1e-6;

/// Everything an alpha-shape pass can produce.
#[derive(Debug, Clone)]
pub enum HullShape {
    /// No area survived the concavity filter.
    Empty,
    /// A single input point.
    Point(Point<f64>),
    /// Two input points.
    Line(LineString<f64>),
    Polygon(Polygon<f64>),
    /// Disjoint hull parts; happens when the concavity filter removes the
    /// triangles bridging distant sub-groups.
    MultiPolygon(MultiPolygon<f64>),
}

/// Compute the alpha shape of a point set in projected meters.
///
/// Never panics: coincident, collinear or otherwise degenerate inputs
/// produce a degenerate [`HullShape`] instead.
pub fn alpha_shape(points: &[Coord<f64>], alpha: f64) -> HullShape {
    match points.len() {
        0 => HullShape::Empty,
        1 => HullShape::Point(points[0].into()),
        2 => HullShape::Line(LineString::from(vec![points[0], points[1]])),
        _ => {
            let radius_limit = 1.0 / alpha;
            let triangles = triangulate(points);

            let mut union: Option<MultiPolygon<f64>> = None;
            for [a, b, c] in triangles {
                let radius = match circumcircle(points[a], points[b], points[c]) {
                    Some((_, radius)) => radius,
                    None => continue,
                };
                if radius >= radius_limit {
                    continue;
                }
                let triangle = MultiPolygon::new(vec![Polygon::new(
                    LineString::from(vec![points[a], points[b], points[c], points[a]]),
                    vec![],
                )]);
                union = Some(match union {
                    Some(acc) => acc.union(&triangle),
                    None => triangle,
                });
            }

            match union {
                None => HullShape::Empty,
                Some(mut multi) => match multi.0.len() {
                    0 => HullShape::Empty,
                    1 => HullShape::Polygon(multi.0.pop().expect("len checked")),
                    _ => HullShape::MultiPolygon(multi),
                },
            }
        }
    }
}

/// Apply the alpha shape to every dense group of a day and keep the parts
/// covering at least `min_surface_ha`. One group can yield several worked
/// polygons when its hull splits; degenerate hulls yield none.
pub fn extract_daily_clusters(day: &DayClusters, config: &AnalysisConfig) -> Vec<DailyCluster> {
    let mut worked = Vec::new();

    for (cluster_index, cluster) in day.clusters.iter().enumerate() {
        let coords: Vec<Coord<f64>> = cluster.iter().map(|fix| fix.coord).collect();
        let jittered = jitter(&coords, jitter_seed(cluster_index));

        let mut keep = |polygon: Polygon<f64>| {
            if polygon.unsigned_area() / 10_000.0 >= config.min_surface_ha {
                worked.push(DailyCluster {
                    date: day.date,
                    geometry: polygon,
                    point_count: cluster.len(),
                });
            }
        };

        match alpha_shape(&jittered, config.alpha) {
            HullShape::Polygon(polygon) => keep(polygon),
            HullShape::MultiPolygon(multi) => {
                for polygon in multi {
                    keep(polygon);
                }
            }
            HullShape::Empty | HullShape::Point(_) | HullShape::Line(_) => {
                log::debug!(
                    "degenerate hull for {} group {} ({} fixes), dropped",
                    day.date,
                    cluster_index,
                    cluster.len()
                );
            }
        }
    }

    worked
}

/// Add bounded uniform noise to every coordinate. Seeded, so the same
/// cluster always gets the same jitter.
fn jitter(points: &[Coord<f64>], seed: u64) -> Vec<Coord<f64>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    points
        .iter()
        .map(|c| Coord {
            x: c.x + rng.gen_range(-JITTER..=JITTER),
            y: c.y + rng.gen_range(-JITTER..=JITTER),
        })
        .collect()
}

/// Seeded by the cluster's ordinal within its day. Two days tracing the
/// exact same fixes then get the exact same jitter, so their hulls merge
/// cleanly instead of leaving micro-slivers in the aggregation.
fn jitter_seed(cluster_index: usize) -> u64 {
    0x9E37_79B9_7F4A_7C15 ^ cluster_index as u64
}

/// Bowyer-Watson Delaunay triangulation. Returns triangles as index triples
/// into `points`.
fn triangulate(points: &[Coord<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return vec![];
    }

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for c in points {
        min_x = min_x.min(c.x);
        min_y = min_y.min(c.y);
        max_x = max_x.max(c.x);
        max_y = max_y.max(c.y);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(1.0);
    let center_x = (min_x + max_x) / 2.0;
    let center_y = (min_y + max_y) / 2.0;

    // Vertices of a triangle comfortably containing every input point
    let mut vertices: Vec<Coord<f64>> = points.to_vec();
    vertices.push(Coord { x: center_x - 20.0 * span, y: center_y - span });
    vertices.push(Coord { x: center_x + 20.0 * span, y: center_y - span });
    vertices.push(Coord { x: center_x, y: center_y + 20.0 * span });

    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];

    for point_index in 0..n {
        let p = vertices[point_index];

        // Triangles whose circumcircle contains the new point form the
        // cavity; a triangle too thin to have a circumcircle is treated as
        // violated so it never survives.
        let mut cavity: Vec<usize> = Vec::new();
        for (triangle_index, &[a, b, c]) in triangles.iter().enumerate() {
            let contains = match circumcircle(vertices[a], vertices[b], vertices[c]) {
                Some((center, radius)) => {
                    let dx = p.x - center.x;
                    let dy = p.y - center.y;
                    dx * dx + dy * dy < radius * radius
                }
                None => true,
            };
            if contains {
                cavity.push(triangle_index);
            }
        }

        // The cavity boundary is the set of edges owned by exactly one
        // cavity triangle
        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for &triangle_index in &cavity {
            let [a, b, c] = triangles[triangle_index];
            for (u, v) in [(a, b), (b, c), (c, a)] {
                let edge = if u < v { (u, v) } else { (v, u) };
                if let Some(found) = boundary.iter().position(|&e| e == edge) {
                    boundary.swap_remove(found);
                } else {
                    boundary.push(edge);
                }
            }
        }

        cavity.sort_unstable_by(|a, b| b.cmp(a));
        for triangle_index in cavity {
            triangles.swap_remove(triangle_index);
        }
        for (u, v) in boundary {
            triangles.push([u, v, point_index]);
        }
    }

    triangles.retain(|t| t.iter().all(|&v| v < n));
    triangles
}

/// Circumcircle center and radius, or `None` for a (near-)degenerate
/// triangle. Computed relative to `a` so the tolerance is independent of
/// the absolute coordinate magnitude.
fn circumcircle(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> Option<(Coord<f64>, f64)> {
    let bx = b.x - a.x;
    let by = b.y - a.y;
    let cx = c.x - a.x;
    let cy = c.y - a.y;

    let d = 2.0 * (bx * cy - by * cx);
    if d.abs() < 1e-12 {
        return None;
    }

    let b_sq = bx * bx + by * by;
    let c_sq = cx * cx + cy * cy;
    let ux = (cy * b_sq - by * c_sq) / d;
    let uy = (bx * c_sq - cx * b_sq) / d;

    let center = Coord { x: a.x + ux, y: a.y + uy };
    let radius = (ux * ux + uy * uy).sqrt();
    Some((center, radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn grid(origin_x: f64, origin_y: f64, count: usize, spacing: f64) -> Vec<Coord<f64>> {
        let mut coords = Vec::new();
        for i in 0..count {
            for j in 0..count {
                coords.push(Coord {
                    x: origin_x + i as f64 * spacing,
                    y: origin_y + j as f64 * spacing,
                });
            }
        }
        coords
    }

    #[test]
    fn test_circumcircle_right_triangle() {
        let (center, radius) = circumcircle(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 0.0, y: 10.0 },
        )
        .unwrap();
        // Hypotenuse midpoint, half-diagonal radius
        assert!((center.x - 5.0).abs() < 1e-9);
        assert!((center.y - 5.0).abs() < 1e-9);
        assert!((radius - 50.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_circumcircle_collinear_is_none() {
        assert!(circumcircle(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 5.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
        )
        .is_none());
    }

    #[test]
    fn test_grid_produces_single_polygon() {
        let coords = grid(0.0, 0.0, 5, 10.0);
        match alpha_shape(&jitter(&coords, 7), 0.02) {
            HullShape::Polygon(polygon) => {
                let area = polygon.unsigned_area();
                assert!(area > 1500.0 && area < 1700.0, "area = {area}");
            }
            other => panic!("expected a polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_distant_groups_split_into_multipolygon() {
        // Two tight triangles 200 m apart; the bridging triangles have
        // circumradius far above 1/alpha = 50 m and get filtered out
        let mut coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 0.0, y: 10.0 },
        ];
        coords.extend([
            Coord { x: 200.0, y: 0.0 },
            Coord { x: 210.0, y: 0.0 },
            Coord { x: 200.0, y: 10.0 },
        ]);
        match alpha_shape(&jitter(&coords, 7), 0.02) {
            HullShape::MultiPolygon(multi) => assert_eq!(multi.0.len(), 2),
            other => panic!("expected two parts, got {other:?}"),
        }
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let coords: Vec<Coord<f64>> =
            (0..5).map(|i| Coord { x: i as f64 * 10.0, y: 0.0 }).collect();
        match alpha_shape(&jitter(&coords, 7), 0.02) {
            HullShape::Empty => {}
            other => panic!("expected empty hull, got {other:?}"),
        }
    }

    #[test]
    fn test_coincident_points_never_panic() {
        let coords = vec![Coord { x: 5.0, y: 5.0 }; 3];
        // Jitter separates the duplicates; whatever the shape, it must not
        // be a panic and a polygon this small must be filtered downstream
        let shape = alpha_shape(&jitter(&coords, 7), 0.02);
        if let HullShape::Polygon(polygon) = shape {
            assert!(polygon.unsigned_area() < 1.0);
        }
    }

    #[test]
    fn test_extract_filters_small_hulls() {
        use crate::clustering::ProjectedFix;

        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let timestamp = date.and_hms_opt(12, 0, 0).unwrap();
        let as_fixes = |coords: &[Coord<f64>]| -> Vec<ProjectedFix> {
            coords
                .iter()
                .enumerate()
                .map(|(i, &coord)| ProjectedFix { position: i, coord, timestamp })
                .collect()
        };

        // 40 m x 40 m worked block (0.16 ha) and a 3 m toy block (far below
        // the 0.1 ha minimum)
        let day = DayClusters {
            date,
            clusters: vec![
                as_fixes(&grid(0.0, 0.0, 5, 10.0)),
                as_fixes(&grid(1000.0, 0.0, 2, 3.0)),
            ],
            noise: vec![],
        };

        let worked = extract_daily_clusters(&day, &AnalysisConfig::default());
        assert_eq!(worked.len(), 1);
        assert_eq!(worked[0].date, date);
        assert_eq!(worked[0].point_count, 25);
        assert!(worked[0].geometry.unsigned_area() / 10_000.0 >= 0.1);
    }
}
