use crate::db::models::platform_models::{group_platforms, PlatformMap, PlatformSensorRow};
use crate::error::Error;
use anyhow::Result;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

/// Platforms and their sensors
#[derive(Clone)]
pub struct PlatformsRepository {
    pool: Arc<PgPool>,
}

impl PlatformsRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Every platform with its sensors
    pub async fn get_all(&self) -> Result<PlatformMap> {
        let rows = sqlx::query_as::<_, PlatformSensorRow>(
            r#"
            SELECT s.sensor_id, p.platform_id, p.name AS platform_name, s.name AS sensor_name, s.fov::float8 AS fov
            FROM starfall_db_schema.platforms p
            INNER JOIN starfall_db_schema.sensors s ON s.platform_id = p.platform_id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get platforms: {}", e)))?;

        Ok(group_platforms(rows))
    }

    /// Rename platforms and rename or re-aim their sensors, all or nothing
    pub async fn update(&self, platforms: &PlatformMap) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        match Self::update_in(&mut tx, platforms).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| Error::Database(format!("Failed to commit platform update: {}", e)))?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log::error!("Rollback of platform update failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn update_in(tx: &mut Transaction<'_, Postgres>, platforms: &PlatformMap) -> Result<()> {
        for platform in platforms.values() {
            sqlx::query("UPDATE starfall_db_schema.platforms SET name = $1 WHERE platform_id = $2")
                .bind(&platform.name)
                .bind(platform.id)
                .execute(&mut **tx)
                .await
                .map_err(|e| Error::Database(format!("Failed to update platform {}: {}", platform.id, e)))?;

            for sensor in platform.sensors.values() {
                sqlx::query("UPDATE starfall_db_schema.sensors SET name = $1, fov = $2 WHERE sensor_id = $3")
                    .bind(&sensor.name)
                    .bind(sensor.fov)
                    .bind(sensor.id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| Error::Database(format!("Failed to update sensor {}: {}", sensor.id, e)))?;
            }
        }
        Ok(())
    }
}
