use crate::analytics::models::{DistinctField, GroupCount, GroupField, Window};
use crate::cursor::CursorData;
use crate::models::{NewVisit, VisitEvent};
use crate::storage::{Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const VISIT_COLUMNS: &str = "id, user_id, ip_address, url, http_method, user_agent, referer, \
     status_code, response_time_ms, traffic_source, page_stay_time_sec, session_id, \
     device_type, operating_system, browser, is_new_visitor, visit_time";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id BIGSERIAL PRIMARY KEY,
                user_id TEXT,
                ip_address TEXT NOT NULL,
                url TEXT NOT NULL,
                http_method TEXT,
                user_agent TEXT,
                referer TEXT,
                status_code INTEGER,
                response_time_ms BIGINT,
                traffic_source TEXT,
                page_stay_time_sec BIGINT,
                session_id TEXT NOT NULL,
                device_type TEXT NOT NULL DEFAULT 'unknown',
                operating_system TEXT,
                browser TEXT,
                is_new_visitor BOOLEAN NOT NULL DEFAULT FALSE,
                visit_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_visit_time ON visits(visit_time)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_visits_ip_time ON visits(ip_address, visit_time)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_session ON visits(session_id)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn insert_visit(&self, visit: &NewVisit) -> StorageResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO visits (
                user_id, ip_address, url, http_method, user_agent, referer,
                traffic_source, page_stay_time_sec, session_id, device_type,
                operating_system, browser, is_new_visitor, visit_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(&visit.user_id)
        .bind(&visit.ip_address)
        .bind(&visit.url)
        .bind(&visit.http_method)
        .bind(&visit.user_agent)
        .bind(&visit.referer)
        .bind(&visit.traffic_source)
        .bind(visit.page_stay_time_sec)
        .bind(&visit.session_id)
        .bind(visit.device_type.as_str())
        .bind(&visit.operating_system)
        .bind(&visit.browser)
        .bind(visit.is_new_visitor)
        .bind(visit.visit_time)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn patch_response(
        &self,
        id: i64,
        status_code: i32,
        response_time_ms: i64,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE visits
            SET status_code = $1, response_time_ms = $2
            WHERE id = $3 AND status_code IS NULL AND response_time_ms IS NULL
            "#,
        )
        .bind(status_code)
        .bind(response_time_ms)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_visit(&self, id: i64) -> StorageResult<Option<VisitEvent>> {
        let visit = sqlx::query_as::<_, VisitEvent>(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(visit)
    }

    async fn latest_visit_time_by_ip(&self, ip_address: &str) -> StorageResult<Option<i64>> {
        let latest = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT visit_time FROM visits
            WHERE ip_address = $1
            ORDER BY visit_time DESC
            LIMIT 1
            "#,
        )
        .bind(ip_address)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(latest)
    }

    async fn count_visits(&self, window: &Window) -> StorageResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM visits WHERE visit_time >= $1 AND visit_time < $2",
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn count_distinct(&self, field: DistinctField, window: &Window) -> StorageResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(DISTINCT {}) FROM visits WHERE visit_time >= $1 AND visit_time < $2",
            field.column()
        ))
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn count_new_visitors(&self, window: &Window) -> StorageResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM visits
            WHERE is_new_visitor AND visit_time >= $1 AND visit_time < $2
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn count_status_at_least(
        &self,
        window: &Window,
        status_code: i32,
    ) -> StorageResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM visits
            WHERE status_code >= $1 AND visit_time >= $2 AND visit_time < $3
            "#,
        )
        .bind(status_code)
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn group_counts(
        &self,
        field: GroupField,
        window: &Window,
        limit: Option<i64>,
    ) -> StorageResult<Vec<GroupCount>> {
        // LIMIT NULL means no limit in PostgreSQL
        let rows = sqlx::query_as::<_, GroupCount>(&format!(
            r#"
            SELECT {column} AS dimension, COUNT(*) AS visit_count
            FROM visits
            WHERE visit_time >= $1 AND visit_time < $2
            GROUP BY {column}
            ORDER BY visit_count DESC, dimension ASC NULLS LAST
            LIMIT $3
            "#,
            column = field.column()
        ))
        .bind(window.start_ms)
        .bind(window.end_ms)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn avg_response_time(&self, window: &Window) -> StorageResult<Option<f64>> {
        let avg = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(response_time_ms)::DOUBLE PRECISION FROM visits
            WHERE response_time_ms IS NOT NULL AND visit_time >= $1 AND visit_time < $2
            "#,
        )
        .bind(window.start_ms)
        .bind(window.end_ms)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(avg)
    }

    async fn recent_visits(
        &self,
        limit: i64,
        before: Option<&CursorData>,
    ) -> StorageResult<Vec<VisitEvent>> {
        let visits = match before {
            Some(cursor) => {
                sqlx::query_as::<_, VisitEvent>(&format!(
                    r#"
                    SELECT {VISIT_COLUMNS} FROM visits
                    WHERE (visit_time, id) < ($1, $2)
                    ORDER BY visit_time DESC, id DESC
                    LIMIT $3
                    "#
                ))
                .bind(cursor.visit_time)
                .bind(cursor.id)
                .bind(limit)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query_as::<_, VisitEvent>(&format!(
                    r#"
                    SELECT {VISIT_COLUMNS} FROM visits
                    ORDER BY visit_time DESC, id DESC
                    LIMIT $1
                    "#
                ))
                .bind(limit)
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };

        Ok(visits)
    }
}
