//! End-to-end walk-through of the zone analysis pipeline.
//!
//! Run with: cargo run --example daily_pipeline

use chrono::NaiveDate;
use field_zones::{
    analyze_positions, AggregationCache, AnalysisConfig, AnalysisWindow, Position, TrackRecord,
    ZoneRecord,
};

const EQUIPMENT: i64 = 1;

fn main() {
    let mut positions = Vec::new();

    // Two mornings of work on the same field (Quebec area), plus a transit
    // to a second field on day two
    field(&mut positions, 46.8100, -71.2000, 1, 0);
    field(&mut positions, 46.8100, -71.2000, 2, 0);
    for (k, lon) in [-71.1960, -71.1950, -71.1940].iter().enumerate() {
        positions.push(Position::new(
            46.8102,
            *lon,
            at(2, 25 + k as u32),
        ));
    }
    field(&mut positions, 46.8100, -71.1860, 2, 28);

    let config = AnalysisConfig::default();
    let report = analyze_positions(&positions, &config);

    println!("Zone Analysis\n");
    println!(
        "Config: eps={}m, min_surface={}ha, alpha={}\n",
        config.eps_meters, config.min_surface_ha, config.alpha
    );

    println!("1. Daily worked polygons: {}", report.daily_clusters.len());
    for cluster in &report.daily_clusters {
        println!("   {} ({} fixes)", cluster.date, cluster.point_count);
    }

    println!("\n2. Aggregated partition: {} cells", report.partition.len());
    for (i, cell) in report.partition.iter().enumerate() {
        println!(
            "   cell {}: {:.2} ha, {} pass(es)",
            i,
            cell.surface_ha(),
            cell.pass_count()
        );
    }

    println!("\n3. Transit tracks: {}", report.tracks.len());
    for track in &report.tracks {
        println!(
            "   {} -> {} ({} fixes)",
            track.start_time, track.end_time, track.position_indices.len()
        );
    }

    println!("\n4. Metrics:");
    println!("   total:    {:.2} ha", report.metrics.total_hectares);
    println!("   relative: {:.2} ha", report.metrics.relative_hectares);
    println!(
        "   distance between zones: {:.0} m",
        report.metrics.distance_between_zones
    );

    // Boundary records, as the persistence layer would store them
    println!("\n5. Records:");
    for cell in &report.partition {
        if let Some(record) = ZoneRecord::from_cell(EQUIPMENT, cell) {
            let preview: String = record.polygon_wkt.chars().take(48).collect();
            println!("   zone {} x{}: {}...", record.date, record.pass_count, preview);
        }
    }
    for track in &report.tracks {
        let record = TrackRecord::from_track(EQUIPMENT, track);
        println!("   track {} -> {}", record.start_time, record.end_time);
    }

    // Reads go through the cache until new zones are written
    let cache = AggregationCache::default();
    let window = AnalysisWindow::all();
    let cached = cache.get_or_compute(EQUIPMENT, window, || report.partition.clone());
    println!("\n6. Cached partition: {} cells", cached.len());
    cache.invalidate(EQUIPMENT);
    println!("   after invalidation: cached = {}", cache.get(EQUIPMENT, window).is_some());
}

fn at(day: u32, step: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 6, day)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
        + chrono::Duration::seconds(step as i64 * 30)
}

/// Push a 5x5 grid of fixes (~11 m apart) starting at the given corner.
fn field(positions: &mut Vec<Position>, lat: f64, lon: f64, day: u32, first_step: u32) {
    for i in 0..5u32 {
        for j in 0..5u32 {
            positions.push(Position::new(
                lat + f64::from(i) * 0.0001,
                lon + f64::from(j) * 0.0001,
                at(day, first_step + i * 5 + j),
            ));
        }
    }
}
