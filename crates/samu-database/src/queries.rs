//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use chrono::NaiveDate;
use samu_core::{AuditEvent, Occurrence, Result, SamuError, Vehicle};
use sqlx::{PgConnection, Row};

pub(crate) fn storage_error(e: sqlx::Error) -> SamuError {
    SamuError::Storage(e.to_string())
}

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 事件表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS occurrences (
                id UUID PRIMARY KEY,
                code VARCHAR(32) NOT NULL,
                state VARCHAR(32) NOT NULL,
                priority SMALLINT NOT NULL,
                regulation_center_id UUID NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                document JSONB NOT NULL
            )
        "#).execute(pool).await.map_err(storage_error)?;

        // 车辆表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS vehicles (
                id UUID PRIMARY KEY,
                plate VARCHAR(16) UNIQUE NOT NULL,
                status VARCHAR(32) NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                document JSONB NOT NULL
            )
        "#).execute(pool).await.map_err(storage_error)?;

        // 审计表，只追加
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id UUID PRIMARY KEY,
                sequence BIGINT NOT NULL,
                occurrence_id UUID NOT NULL REFERENCES occurrences(id),
                kind VARCHAR(48) NOT NULL,
                assignment_id UUID,
                patient_id UUID,
                recorded_at TIMESTAMP WITH TIME ZONE NOT NULL,
                document JSONB NOT NULL
            )
        "#).execute(pool).await.map_err(storage_error)?;

        // 显示用流水号计数器，按日重置
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS display_code_counters (
                day DATE PRIMARY KEY,
                counter BIGINT NOT NULL
            )
        "#).execute(pool).await.map_err(storage_error)?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_occurrences_state ON occurrences(state)",
            "CREATE INDEX IF NOT EXISTS idx_occurrences_priority ON occurrences(priority, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_occurrences_center ON occurrences(regulation_center_id)",
            "CREATE INDEX IF NOT EXISTS idx_occurrences_code ON occurrences(code)",
            "CREATE INDEX IF NOT EXISTS idx_vehicles_status ON vehicles(status)",
            "CREATE INDEX IF NOT EXISTS idx_audit_occurrence ON audit_events(occurrence_id, recorded_at, sequence)",
            "CREATE INDEX IF NOT EXISTS idx_audit_assignment ON audit_events(assignment_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_patient ON audit_events(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_audit_kind ON audit_events(kind, recorded_at)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(storage_error)?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 写入 ==========

    /// 写入或更新事件
    pub async fn upsert_occurrence(conn: &mut PgConnection, occurrence: &Occurrence) -> Result<()> {
        let row = DbOccurrence::from_occurrence(occurrence)?;

        sqlx::query(r#"
            INSERT INTO occurrences (id, code, state, priority, regulation_center_id, created_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                state = EXCLUDED.state,
                priority = EXCLUDED.priority,
                document = EXCLUDED.document,
                updated_at = NOW()
        "#)
        .bind(row.id)
        .bind(&row.code)
        .bind(&row.state)
        .bind(row.priority)
        .bind(row.regulation_center_id)
        .bind(row.created_at)
        .bind(&row.document)
        .execute(conn)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    /// 写入或更新车辆
    pub async fn upsert_vehicle(conn: &mut PgConnection, vehicle: &Vehicle) -> Result<()> {
        let row = DbVehicle::from_vehicle(vehicle)?;

        sqlx::query(r#"
            INSERT INTO vehicles (id, plate, status, active, document)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                plate = EXCLUDED.plate,
                status = EXCLUDED.status,
                active = EXCLUDED.active,
                document = EXCLUDED.document,
                updated_at = NOW()
        "#)
        .bind(row.id)
        .bind(&row.plate)
        .bind(&row.status)
        .bind(row.active)
        .bind(&row.document)
        .execute(conn)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    /// 追加审计事件；重复写入同一事件时忽略
    pub async fn insert_audit_event(conn: &mut PgConnection, event: &AuditEvent) -> Result<()> {
        let row = DbAuditEvent::from_event(event)?;

        sqlx::query(r#"
            INSERT INTO audit_events (id, sequence, occurrence_id, kind, assignment_id, patient_id, recorded_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
        "#)
        .bind(row.id)
        .bind(row.sequence)
        .bind(row.occurrence_id)
        .bind(&row.kind)
        .bind(row.assignment_id)
        .bind(row.patient_id)
        .bind(row.recorded_at)
        .bind(&row.document)
        .execute(conn)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    /// 取下一个流水号
    pub async fn next_display_counter(&self, day: NaiveDate) -> Result<u64> {
        let pool = self.pool.pool();

        let counter: i64 = sqlx::query(r#"
            INSERT INTO display_code_counters (day, counter) VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET counter = display_code_counters.counter + 1
            RETURNING counter
        "#)
        .bind(day)
        .fetch_one(pool)
        .await
        .map(|row| row.get("counter"))
        .map_err(storage_error)?;

        u64::try_from(counter).map_err(|_| SamuError::Storage(format!("invalid counter {}", counter)))
    }

    // ========== 读取 ==========

    pub async fn load_occurrences(&self) -> Result<Vec<Occurrence>> {
        let pool = self.pool.pool();

        let rows = sqlx::query_as::<_, DbOccurrence>(
            "SELECT id, code, state, priority, regulation_center_id, created_at, document FROM occurrences ORDER BY created_at"
        )
        .fetch_all(pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Occurrence::try_from).collect()
    }

    pub async fn load_vehicles(&self) -> Result<Vec<Vehicle>> {
        let pool = self.pool.pool();

        let rows = sqlx::query_as::<_, DbVehicle>(
            "SELECT id, plate, status, active, document FROM vehicles ORDER BY plate"
        )
        .fetch_all(pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Vehicle::try_from).collect()
    }

    pub async fn load_audit_events(&self) -> Result<Vec<AuditEvent>> {
        let pool = self.pool.pool();

        let rows = sqlx::query_as::<_, DbAuditEvent>(
            "SELECT id, sequence, occurrence_id, kind, assignment_id, patient_id, recorded_at, document FROM audit_events ORDER BY recorded_at, sequence"
        )
        .fetch_all(pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    /// 单个事件的完整审计轨迹
    pub async fn audit_trail(&self, occurrence_id: uuid::Uuid) -> Result<Vec<AuditEvent>> {
        let pool = self.pool.pool();

        let rows = sqlx::query_as::<_, DbAuditEvent>(
            "SELECT id, sequence, occurrence_id, kind, assignment_id, patient_id, recorded_at, document FROM audit_events WHERE occurrence_id = $1 ORDER BY recorded_at, sequence"
        )
        .bind(occurrence_id)
        .fetch_all(pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }
}
