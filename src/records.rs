//! # Boundary Records
//!
//! The shapes this crate exchanges with the persistence and visualization
//! collaborators. Geometry crosses the boundary as WGS84 WKT even though
//! every computation runs in projected meters; the conversions here own
//! that round trip.
//!
//! Parsing a record back (to re-aggregate a persisted partition) is the
//! only fallible operation in the crate and surfaces as [`RecordError`].

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

use chrono::{NaiveDate, NaiveDateTime};
use geo::MultiPolygon;
use wkt::{ToWkt, TryFromWkt};

use crate::aggregate::ZoneCell;
use crate::projection::{geometry_to_mercator, geometry_to_wgs84};
use crate::track::Track;
use crate::EquipmentId;

/// A record failed to parse back into geometry.
#[derive(Debug, Clone)]
pub enum RecordError {
    /// The WKT text itself is malformed.
    Wkt(String),
    /// The WKT parsed, but into a geometry type the record cannot hold.
    UnexpectedGeometry(&'static str),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Wkt(message) => write!(f, "malformed WKT: {message}"),
            RecordError::UnexpectedGeometry(expected) => {
                write!(f, "unexpected geometry type, expected {expected}")
            }
        }
    }
}

impl Error for RecordError {}

/// One persisted partition cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoneRecord {
    pub equipment_id: EquipmentId,
    /// Earliest covered date.
    pub date: NaiveDate,
    pub surface_ha: f64,
    /// Cell geometry as WGS84 WKT.
    pub polygon_wkt: String,
    pub pass_count: u32,
    /// All distinct covered dates, ascending.
    pub dates: Vec<NaiveDate>,
}

impl ZoneRecord {
    /// Serialize a partition cell. Returns `None` for a cell without dates,
    /// which aggregation never produces.
    pub fn from_cell(equipment_id: EquipmentId, cell: &ZoneCell) -> Option<Self> {
        let date = *cell.dates.iter().next()?;
        Some(Self {
            equipment_id,
            date,
            surface_ha: cell.surface_ha(),
            polygon_wkt: geometry_to_wgs84(&cell.geometry).wkt_string(),
            pass_count: cell.pass_count(),
            dates: cell.dates.iter().copied().collect(),
        })
    }

    /// Parse the record back into a projected partition cell, for example
    /// to re-aggregate a persisted history.
    pub fn to_cell(&self) -> Result<ZoneCell, RecordError> {
        let geometry = parse_polygonal(&self.polygon_wkt)?;
        let dates: BTreeSet<NaiveDate> = if self.dates.is_empty() {
            BTreeSet::from([self.date])
        } else {
            self.dates.iter().copied().collect()
        };
        Ok(ZoneCell::new(geometry_to_mercator(&geometry), dates))
    }
}

/// One persisted transit segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackRecord {
    pub equipment_id: EquipmentId,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Polyline as WGS84 WKT.
    pub line_wkt: String,
}

impl TrackRecord {
    pub fn from_track(equipment_id: EquipmentId, track: &Track) -> Self {
        Self {
            equipment_id,
            start_time: track.start_time,
            end_time: track.end_time,
            line_wkt: geometry_to_wgs84(&track.line).wkt_string(),
        }
    }
}

fn parse_polygonal(text: &str) -> Result<MultiPolygon<f64>, RecordError> {
    let geometry: geo::Geometry<f64> =
        geo::Geometry::try_from_wkt_str(text).map_err(|e| RecordError::Wkt(e.to_string()))?;
    match geometry {
        geo::Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) => Ok(multi),
        _ => Err(RecordError::UnexpectedGeometry("POLYGON or MULTIPOLYGON")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, Coord, LineString};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, day).unwrap()
    }

    fn field_cell() -> ZoneCell {
        // A ~100 m square on real coordinates, built in WGS84 then projected
        let wgs = polygon![
            (x: -71.2000, y: 46.8100),
            (x: -71.1987, y: 46.8100),
            (x: -71.1987, y: 46.8109),
            (x: -71.2000, y: 46.8109),
        ];
        ZoneCell::new(
            MultiPolygon::new(vec![geometry_to_mercator(&wgs)]),
            BTreeSet::from([date(1), date(3)]),
        )
    }

    #[test]
    fn test_zone_record_fields() {
        let cell = field_cell();
        let record = ZoneRecord::from_cell(42, &cell).unwrap();

        assert_eq!(record.equipment_id, 42);
        assert_eq!(record.date, date(1));
        assert_eq!(record.pass_count, 2);
        assert_eq!(record.dates, vec![date(1), date(3)]);
        assert!(record.polygon_wkt.starts_with("MULTIPOLYGON"));
        assert!((record.surface_ha - cell.surface_ha()).abs() < 1e-12);
    }

    #[test]
    fn test_zone_record_round_trip() {
        let cell = field_cell();
        let record = ZoneRecord::from_cell(42, &cell).unwrap();
        let restored = record.to_cell().unwrap();

        assert_eq!(restored.dates, cell.dates);
        let original = cell.geometry.unsigned_area();
        let back = restored.geometry.unsigned_area();
        assert!((original - back).abs() < 1e-6 * original);
    }

    #[test]
    fn test_malformed_wkt_is_an_error() {
        let record = ZoneRecord {
            equipment_id: 1,
            date: date(1),
            surface_ha: 0.0,
            polygon_wkt: "MULTIPOLYGON(((".into(),
            pass_count: 1,
            dates: vec![date(1)],
        };
        assert!(matches!(record.to_cell(), Err(RecordError::Wkt(_))));
    }

    #[test]
    fn test_non_polygonal_wkt_is_rejected() {
        let record = ZoneRecord {
            equipment_id: 1,
            date: date(1),
            surface_ha: 0.0,
            polygon_wkt: "POINT(1 2)".into(),
            pass_count: 1,
            dates: vec![date(1)],
        };
        assert!(matches!(
            record.to_cell(),
            Err(RecordError::UnexpectedGeometry(_))
        ));
    }

    #[test]
    fn test_track_record_is_wgs84() {
        let track = Track {
            start_time: date(1).and_hms_opt(8, 0, 0).unwrap(),
            end_time: date(1).and_hms_opt(8, 5, 0).unwrap(),
            line: LineString::from(vec![
                crate::projection::to_mercator(Coord { x: -71.2, y: 46.81 }),
                crate::projection::to_mercator(Coord { x: -71.19, y: 46.81 }),
            ]),
            position_indices: vec![4, 5],
        };
        let record = TrackRecord::from_track(7, &track);

        assert_eq!(record.equipment_id, 7);
        assert!(record.line_wkt.starts_with("LINESTRING"));

        // Coordinates must be back in degrees
        let line: LineString<f64> = LineString::try_from_wkt_str(&record.line_wkt).unwrap();
        assert!((line.0[0].x - -71.2).abs() < 1e-9);
        assert!((line.0[0].y - 46.81).abs() < 1e-9);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_zone_record_serializes() {
        let record = ZoneRecord::from_cell(42, &field_cell()).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: ZoneRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
