use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::light_curve::LightCurveSeries;

/// A tagged point source of one sighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PointSourceRow {
    pub tag: String,
    pub point_source_id: Uuid,
    pub time: Option<f64>,
    pub intensity: Option<f64>,
    pub cluster_size: Option<i32>,
    pub meas_near_point_ecef_m: Option<Vec<Option<f64>>>,
    pub meas_far_point_ecef_m: Option<Vec<Option<f64>>>,
    pub above_horizon: Option<bool>,
    pub sensor_id: Uuid,
}

pub const POINT_SOURCE_COLUMNS: &str = "tag, ps.point_source_id, \
    ps.time::float8 AS time, \
    ps.intensity::float8 AS intensity, \
    ps.cluster_size::int4 AS cluster_size, \
    ps.meas_near_point_ecef_m::float8[] AS meas_near_point_ecef_m, \
    ps.meas_far_point_ecef_m::float8[] AS meas_far_point_ecef_m, \
    ps.above_horizon, \
    s.sensor_id";

/// Detail view payload: point sources per sighting and decoded light
/// curves grouped by curve type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    pub sightings: BTreeMap<Uuid, Vec<PointSourceRow>>,
    pub light_curves: BTreeMap<i32, Vec<LightCurveSeries>>,
}

/// Point sources re-selected through a point source filter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SightingsUpdate {
    pub sightings: BTreeMap<Uuid, Vec<PointSourceRow>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtentFilter {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub extents: [f64; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonFilter {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub above: bool,
    #[serde(default)]
    pub below: bool,
}

/// Sphere around a WGS84 position, radius in meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoFilter {
    #[serde(default)]
    pub enabled: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub radius: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagFilter {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSourceFilter {
    #[serde(default)]
    pub cluster_size: ExtentFilter,
    #[serde(default)]
    pub horizon: HorizonFilter,
    #[serde(default)]
    pub intensity: ExtentFilter,
    #[serde(default)]
    pub time: ExtentFilter,
    #[serde(default)]
    pub geo: GeoFilter,
    #[serde(default)]
    pub tags: TagFilter,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSourceFilterRequest {
    pub filter: PointSourceFilter,
    pub event_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct PointSourceStats {
    pub min_time: Option<f64>,
    pub max_time: Option<f64>,
    pub min_intensity: Option<f64>,
    pub max_intensity: Option<f64>,
    pub min_cluster_size: Option<i32>,
    pub max_cluster_size: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSourceFilterExtents {
    pub min_time: Option<f64>,
    pub max_time: Option<f64>,
    pub min_intensity: Option<f64>,
    pub max_intensity: Option<f64>,
    pub min_cluster_size: Option<i32>,
    pub max_cluster_size: Option<i32>,
    pub tags: Vec<String>,
}

impl PointSourceFilterExtents {
    pub fn new(stats: PointSourceStats, tags: Vec<String>) -> Self {
        Self {
            min_time: stats.min_time,
            max_time: stats.max_time,
            min_intensity: stats.min_intensity,
            max_intensity: stats.max_intensity,
            min_cluster_size: stats.min_cluster_size,
            max_cluster_size: stats.max_cluster_size,
            tags,
        }
    }
}

/// Sighting of an event with the sensor, platform and location behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorForEvent {
    pub event_id: Uuid,
    pub sighting_id: Uuid,
    pub platform_id: Uuid,
    pub sensor_id: Uuid,
    pub platform_name: Option<String>,
    pub sensor_name: Option<String>,
    pub sensor_type: Option<String>,
    pub fov: Option<f64>,
    pub pos_ecef_m: Option<Vec<Option<f64>>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_request_parses_partial_filter() {
        let request: PointSourceFilterRequest = serde_json::from_value(json!({
            "eventId": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "filter": {
                "clusterSize": {"enabled": true, "extents": [2, 40]},
                "tags": {"enabled": true, "tags": ["Accepted"]}
            }
        }))
        .unwrap();

        assert_eq!(request.filter.cluster_size.extents, [2.0, 40.0]);
        assert!(!request.filter.geo.enabled);
        assert_eq!(request.filter.tags.tags, vec!["Accepted"]);
    }
}
