use crate::db::models::event_models::ProcessingState;
use crate::db::models::light_curve::{translate_light_curves, LightCurveSeries};
use crate::db::models::point_source_models::{
    EventDetails, PointSourceFilter, PointSourceFilterExtents, PointSourceRow, PointSourceStats,
    SensorForEvent, SightingsUpdate,
};
use crate::db::query::{
    build_detail_point_source_query, build_point_source_filter_query, to_arguments, BindValue,
};
use crate::error::Error;
use anyhow::Result;
use futures::future::try_join_all;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Sightings, point sources and light curves of events
#[derive(Clone)]
pub struct PointSourcesRepository {
    pool: Arc<PgPool>,
}

impl PointSourcesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn get_sighting_ids(&self, event_id: &Uuid) -> Result<Vec<Uuid>> {
        let result = sqlx::query_scalar::<_, Uuid>(
            "SELECT sighting_id FROM starfall_db_schema.sightings WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get sightings: {}", e)))?;

        Ok(result)
    }

    /// Point sources of each sighting, fetched concurrently. Sightings
    /// without a matching point source are left out.
    async fn point_sources_by_sighting(
        &self,
        sightings: &[Uuid],
        sql: &str,
        params: &[BindValue],
    ) -> Result<BTreeMap<Uuid, Vec<PointSourceRow>>> {
        let fetches = sightings.iter().map(|sighting_id| async move {
            let mut bound = Vec::with_capacity(params.len() + 1);
            bound.push(BindValue::Uuid(*sighting_id));
            bound.extend(params.iter().cloned());
            let args = to_arguments(&bound)?;

            let rows = sqlx::query_as_with::<_, PointSourceRow, _>(sql, args)
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to get point sources: {}", e)))?;
            Ok::<_, anyhow::Error>((*sighting_id, rows))
        });

        Ok(try_join_all(fetches)
            .await?
            .into_iter()
            .filter(|(_, rows)| !rows.is_empty())
            .collect())
    }

    /// Decoded light curves of every sighting of the event, grouped by curve type
    pub async fn get_light_curves(&self, event_id: &Uuid) -> Result<BTreeMap<i32, Vec<LightCurveSeries>>> {
        let rows = sqlx::query_as::<_, (Uuid, Vec<u8>)>(
            r#"
            SELECT s.sensor_id, lc.data
            FROM starfall_db_schema.light_curves lc
            INNER JOIN starfall_db_schema.sightings s ON s.sighting_id = lc.sighting_id
            WHERE s.event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get light curves: {}", e)))?;

        let mut grouped: BTreeMap<i32, Vec<LightCurveSeries>> = BTreeMap::new();
        for (sensor_id, data) in rows {
            for curve in translate_light_curves(&data, sensor_id) {
                grouped.entry(curve.curve_type).or_default().push(curve);
            }
        }
        Ok(grouped)
    }

    /// Point sources shown for an event in the given state plus its light
    /// curves. `None` when the event has no sightings.
    pub async fn get_event_details(&self, event_id: &Uuid, state: ProcessingState) -> Result<Option<EventDetails>> {
        let sightings = self.get_sighting_ids(event_id).await?;
        if sightings.is_empty() {
            return Ok(None);
        }

        let sql = build_detail_point_source_query(state);
        let (sightings, light_curves) = tokio::try_join!(
            self.point_sources_by_sighting(&sightings, &sql, &[]),
            self.get_light_curves(event_id),
        )?;

        Ok(Some(EventDetails {
            sightings,
            light_curves,
        }))
    }

    /// Point sources of an event narrowed by a filter. `None` when the event
    /// has no sightings.
    pub async fn get_filtered_sightings(
        &self,
        event_id: &Uuid,
        filter: &PointSourceFilter,
    ) -> Result<Option<SightingsUpdate>> {
        let sightings = self.get_sighting_ids(event_id).await?;
        if sightings.is_empty() {
            return Ok(None);
        }

        let query = build_point_source_filter_query(filter);
        let sightings = self
            .point_sources_by_sighting(&sightings, &query.sql, &query.params)
            .await?;

        Ok(Some(SightingsUpdate { sightings }))
    }

    /// One point source with its accessory columns, sensor and platform
    /// names and tags
    pub async fn get_point_source_details(&self, point_source_id: &Uuid) -> Result<Option<Value>> {
        let row = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT to_jsonb(ps)
                || COALESCE(to_jsonb(accessory) - 'point_source_id', '{}'::jsonb)
                || jsonb_build_object('sensor_name', sensors.name, 'platform_name', platforms.name)
            FROM starfall_db_schema.point_sources ps
            LEFT JOIN starfall_db_schema.point_source_accessory accessory ON accessory.point_source_id = ps.point_source_id
            INNER JOIN starfall_db_schema.sightings sightings ON sightings.sighting_id = ps.sighting_id
            INNER JOIN starfall_db_schema.sensors sensors ON sensors.sensor_id = sightings.sensor_id
            INNER JOIN starfall_db_schema.platforms platforms ON platforms.platform_id = sensors.platform_id
            WHERE ps.point_source_id = $1
            "#,
        )
        .bind(point_source_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get point source details: {}", e)))?;

        let mut details = match row {
            Some(Value::Object(details)) => details,
            Some(_) | None => return Ok(None),
        };

        let tags = sqlx::query_scalar::<_, String>(
            "SELECT tag FROM starfall_db_schema.tags WHERE point_source_id = $1",
        )
        .bind(point_source_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get point source tags: {}", e)))?;

        details.insert("tags".to_string(), Value::from(tags));
        Ok(Some(Value::Object(details)))
    }

    /// Sightings of the top-level event with their sensor, platform and location
    pub async fn get_sensors_for_event(&self, event_id: &Uuid) -> Result<Vec<SensorForEvent>> {
        let result = sqlx::query_as::<_, SensorForEvent>(
            r#"
            SELECT
                sightings.event_id, sightings.sighting_id, sensors.platform_id,
                sightings.sensor_id, platforms.name AS platform_name,
                sensors.name AS sensor_name, sensors.type::text AS sensor_type,
                sensors.fov::float8 AS fov, locations.pos_ecef_m::float8[] AS pos_ecef_m
            FROM starfall_db_schema.sightings
            INNER JOIN starfall_db_schema.sensors ON sensors.sensor_id = sightings.sensor_id
            LEFT JOIN starfall_db_schema.locations ON locations.location_id = sightings.location_id
            INNER JOIN starfall_db_schema.platforms ON platforms.platform_id = sensors.platform_id
            WHERE sightings.event_id = (
                SELECT COALESCE(parent_id, event_id) FROM starfall_db_schema.events WHERE event_id = $1
            )
            "#,
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get sensors for event: {}", e)))?;

        Ok(result)
    }

    /// Ranges and tags the point source filter can be set to for an event
    pub async fn get_filter_extents(&self, event_id: &Uuid) -> Result<PointSourceFilterExtents> {
        let stats = sqlx::query_as::<_, PointSourceStats>(
            r#"
            SELECT
                MIN(time)::float8 AS min_time,
                MAX(time)::float8 AS max_time,
                MIN(intensity)::float8 AS min_intensity,
                MAX(intensity)::float8 AS max_intensity,
                MIN(cluster_size)::int4 AS min_cluster_size,
                MAX(cluster_size)::int4 AS max_cluster_size
            FROM starfall_db_schema.point_sources
            WHERE sighting_id IN (
                SELECT sighting_id FROM starfall_db_schema.sightings WHERE event_id = $1
            )
            "#,
        )
        .bind(event_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get point source extents: {}", e)))?;

        let tags = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tag FROM starfall_db_schema.tags WHERE event_id = $1 ORDER BY tag",
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get event tags: {}", e)))?;

        Ok(PointSourceFilterExtents::new(stats, tags))
    }
}
