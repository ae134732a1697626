use crate::db::models::event_models::{
    Event, HistoryEntry, HistoryNote, Page, PageData, StateCount, EVENT_COLUMNS, HISTORY_COLUMNS,
};
use crate::db::query::{build_filtered_count_query, build_page_query, to_arguments};
use crate::error::Error;
use anyhow::Result;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Events repository: event rows and their history
#[derive(Clone)]
pub struct EventsRepository {
    pool: Arc<PgPool>,
}

impl EventsRepository {
    /// Create a new events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get event by ID
    pub async fn get_by_id(&self, event_id: &Uuid) -> Result<Option<Event>> {
        let sql = format!(
            "SELECT {} FROM starfall_db_schema.events WHERE event_id = $1",
            EVENT_COLUMNS
        );
        let result = sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get event by ID: {}", e)))?;

        Ok(result)
    }

    /// Processing state of an event, `None` when the event does not exist
    pub async fn get_processing_state(&self, event_id: &Uuid) -> Result<Option<i32>> {
        let result = sqlx::query_scalar::<_, i32>(
            "SELECT processing_state::int4 FROM starfall_db_schema.events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get processing state: {}", e)))?;

        Ok(result)
    }

    /// One page of the event list with the counts and extents dashboards
    /// show next to it. Nothing is returned unless every query succeeds.
    pub async fn get_page(&self, page: &Page) -> Result<PageData> {
        let data_query = build_page_query(page)?;
        let count_query = build_filtered_count_query(page);
        let data_args = to_arguments(&data_query.params)?;
        let count_args = to_arguments(&count_query.params)?;
        let pool = &*self.pool;

        let (data, total, unviewed, energy, dates, filtered, states) = tokio::try_join!(
            sqlx::query_as_with::<_, Event, _>(&data_query.sql, data_args).fetch_all(pool),
            sqlx::query_scalar::<_, String>("SELECT COUNT(*)::text FROM starfall_db_schema.events")
                .fetch_one(pool),
            sqlx::query_scalar::<_, String>(
                "SELECT COUNT(*)::text FROM starfall_db_schema.events \
                 WHERE starfall_db_schema.events.user_viewed = false"
            )
            .fetch_one(pool),
            sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
                "SELECT MIN(approx_energy_j)::float8 AS min_energy, MAX(approx_energy_j)::float8 AS max_energy \
                 FROM starfall_db_schema.events WHERE approx_energy_j > 0"
            )
            .fetch_one(pool),
            sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
                "SELECT MIN(approx_trigger_time)::float8 AS min_date, MAX(approx_trigger_time)::float8 AS max_date \
                 FROM starfall_db_schema.events"
            )
            .fetch_one(pool),
            sqlx::query_scalar_with::<_, String, _>(&count_query.sql, count_args).fetch_one(pool),
            sqlx::query_as::<_, StateCount>(
                "SELECT processing_state::int4 AS processing_state, COUNT(processing_state)::text AS count \
                 FROM starfall_db_schema.events GROUP BY processing_state ORDER BY processing_state"
            )
            .fetch_all(pool),
        )
        .map_err(|e| Error::Database(format!("Failed to get event page: {}", e)))?;

        Ok(PageData {
            data,
            total_count: total,
            filtered_count: filtered,
            unviewed,
            page_number: page.page_number,
            page_size: page.page_size,
            min_date: dates.0,
            max_date: dates.1,
            min_energy: energy.0,
            max_energy: energy.1,
            state_count: states,
        })
    }

    /// History of an event, oldest first
    pub async fn get_history(&self, event_id: &Uuid) -> Result<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT {} FROM starfall_db_schema.history WHERE event_id = $1 ORDER BY time",
            HISTORY_COLUMNS
        );
        let result = sqlx::query_as::<_, HistoryEntry>(&sql)
            .bind(event_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get event history: {}", e)))?;

        Ok(result)
    }

    /// Append an analyst note to an event's history
    pub async fn add_history_note(&self, note: &HistoryNote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO starfall_db_schema.history (history_id, time, entry, author, event_id)
            VALUES ($1, EXTRACT(epoch FROM now()), $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&note.entry)
        .bind(&note.author)
        .bind(note.event_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to save history note: {}", e)))?;

        Ok(())
    }

    /// Set the processing state and return the updated row
    pub async fn set_processing_state(&self, event_id: &Uuid, state: i32) -> Result<Option<Event>> {
        let sql = format!(
            "UPDATE starfall_db_schema.events SET processing_state = $1 WHERE event_id = $2 RETURNING {}",
            EVENT_COLUMNS
        );
        let result = sqlx::query_as::<_, Event>(&sql)
            .bind(state)
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to change processing state: {}", e)))?;

        Ok(result)
    }

    /// Flip the viewed flag and return the updated row
    pub async fn toggle_viewed(&self, event_id: &Uuid) -> Result<Option<Event>> {
        let sql = format!(
            "UPDATE starfall_db_schema.events SET user_viewed = NOT user_viewed WHERE event_id = $1 RETURNING {}",
            EVENT_COLUMNS
        );
        let result = sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to toggle viewed: {}", e)))?;

        Ok(result)
    }

    /// Clear the velocity estimate and return the updated row
    pub async fn delete_velocity(&self, event_id: &Uuid) -> Result<Option<Event>> {
        let sql = format!(
            "UPDATE starfall_db_schema.events SET velocity_ecef_m_sec = '{{null,null,null}}' \
             WHERE event_id = $1 RETURNING {}",
            EVENT_COLUMNS
        );
        let result = sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete velocity: {}", e)))?;

        Ok(result)
    }

    /// Delete an event, returns whether a row was removed
    pub async fn delete(&self, event_id: &Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM starfall_db_schema.events WHERE event_id = $1")
            .bind(event_id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete event: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Copy an event and its history in one transaction. The copy points at
    /// the top-level event so parent links stay one level deep.
    pub async fn duplicate(&self, event_id: &Uuid) -> Result<Event> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        match Self::duplicate_in(&mut tx, event_id).await {
            Ok(event) => {
                tx.commit()
                    .await
                    .map_err(|e| Error::Database(format!("Failed to commit duplicate: {}", e)))?;
                Ok(event)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log::error!("Rollback of duplicate failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn duplicate_in(tx: &mut Transaction<'_, Postgres>, event_id: &Uuid) -> Result<Event> {
        let sql = format!(
            r#"
            INSERT INTO starfall_db_schema.events (
                event_id, parent_id, approx_trigger_time, created_time, last_update_time,
                processing_state, user_viewed, approx_energy_j, location_ecef_m, velocity_ecef_m_sec
            )
            SELECT $2, COALESCE(parent_id, event_id), approx_trigger_time, created_time, EXTRACT(epoch FROM now()),
                processing_state, false, approx_energy_j, location_ecef_m, velocity_ecef_m_sec
            FROM starfall_db_schema.events
            WHERE event_id = $1
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        let copy = sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .bind(Uuid::new_v4())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to copy event: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("Event {} does not exist", event_id)))?;

        let parent_id = copy.parent_id.unwrap_or(*event_id);

        sqlx::query(
            r#"
            INSERT INTO starfall_db_schema.history (history_id, time, entry, author, event_id)
            SELECT gen_random_uuid(), time, entry, author, $2
            FROM starfall_db_schema.history
            WHERE event_id = $1
            "#,
        )
        .bind(parent_id)
        .bind(copy.event_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to copy history: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO starfall_db_schema.history (history_id, time, entry, author, event_id)
            VALUES ($1, EXTRACT(epoch FROM now()), $2, 'Database', $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(format!("duplicated from {}", parent_id))
        .bind(copy.event_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to record duplication: {}", e)))?;

        // TODO: copy group associations once groups are stored alongside events

        Ok(copy)
    }
}
