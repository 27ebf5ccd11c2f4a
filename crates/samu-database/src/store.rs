//! PostgreSQL 持久化
//!
//! 每次提交在一个事务内完成，事务失败时调用方的内存状态保持不变。

use async_trait::async_trait;
use chrono::NaiveDate;
use samu_core::collaborators::{Persistence, SequenceGenerator, StoredState};
use samu_core::utils::format_display_code;
use samu_core::{AuditEvent, Occurrence, Result, Vehicle};

use crate::connection::DatabasePool;
use crate::queries::{storage_error, DatabaseQueries};

/// 基于 PostgreSQL 的存储
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 建表并返回存储
    pub async fn initialize(pool: DatabasePool) -> Result<Self> {
        DatabaseQueries::new(&pool).create_tables().await?;
        Ok(Self::new(pool))
    }

    pub fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(&self.pool)
    }
}

#[async_trait]
impl Persistence for PgStore {
    async fn save_occurrence(&self, occurrence: &Occurrence, event: &AuditEvent) -> Result<()> {
        let mut tx = self.pool.pool().begin().await.map_err(storage_error)?;
        DatabaseQueries::upsert_occurrence(&mut tx, occurrence).await?;
        DatabaseQueries::insert_audit_event(&mut tx, event).await?;
        tx.commit().await.map_err(storage_error)
    }

    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        let mut conn = self.pool.pool().acquire().await.map_err(storage_error)?;
        DatabaseQueries::upsert_vehicle(&mut conn, vehicle).await
    }

    async fn save_dispatch(
        &self,
        occurrence: &Occurrence,
        vehicle: &Vehicle,
        event: &AuditEvent,
    ) -> Result<()> {
        let mut tx = self.pool.pool().begin().await.map_err(storage_error)?;
        DatabaseQueries::upsert_occurrence(&mut tx, occurrence).await?;
        DatabaseQueries::upsert_vehicle(&mut tx, vehicle).await?;
        DatabaseQueries::insert_audit_event(&mut tx, event).await?;
        tx.commit().await.map_err(storage_error)
    }

    async fn load(&self) -> Result<StoredState> {
        let queries = self.queries();
        let state = StoredState {
            occurrences: queries.load_occurrences().await?,
            vehicles: queries.load_vehicles().await?,
            events: queries.load_audit_events().await?,
        };
        tracing::info!(
            "Loaded {} occurrences, {} vehicles and {} audit events from database",
            state.occurrences.len(),
            state.vehicles.len(),
            state.events.len()
        );
        Ok(state)
    }
}

#[async_trait]
impl SequenceGenerator for PgStore {
    async fn next_code(&self, date: NaiveDate) -> Result<String> {
        let counter = self.queries().next_display_counter(date).await?;
        Ok(format_display_code(date, counter))
    }
}
