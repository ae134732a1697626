use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PlatformSensorRow {
    pub sensor_id: Uuid,
    pub platform_id: Uuid,
    pub platform_name: Option<String>,
    pub sensor_name: Option<String>,
    pub fov: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: Uuid,
    pub name: Option<String>,
    pub fov: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: Uuid,
    pub name: Option<String>,
    #[serde(default)]
    pub sensors: BTreeMap<Uuid, Sensor>,
}

/// Platforms keyed by id, each with its sensors keyed by id
pub type PlatformMap = BTreeMap<Uuid, Platform>;

pub fn group_platforms(rows: Vec<PlatformSensorRow>) -> PlatformMap {
    let mut platforms = PlatformMap::new();
    for row in rows {
        let platform = platforms.entry(row.platform_id).or_insert_with(|| Platform {
            id: row.platform_id,
            name: row.platform_name.clone(),
            sensors: BTreeMap::new(),
        });
        platform.sensors.insert(
            row.sensor_id,
            Sensor {
                id: row.sensor_id,
                name: row.sensor_name,
                fov: row.fov,
            },
        );
    }
    platforms
}
