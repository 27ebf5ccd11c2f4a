//! 外部协作方接口
//!
//! 人员目录、调节中心目录、医疗机构目录、地理编码、持久化与流水号生成。
//! 核心只依赖这些 trait，具体实现由 samu-integration / samu-database 或测试提供。

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::fleet::Vehicle;
use crate::models::{AuditEvent, Coordinates, Occurrence};
use crate::utils::format_display_code;

/// 目录条目（人员、调节中心、医疗机构通用）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub name: String,
}

impl DirectoryEntry {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// 人员目录：解析调度员/调节医生的显示名称
#[async_trait]
pub trait OperatorDirectory: Send + Sync {
    async fn find_operator(&self, operator_id: Uuid) -> Result<Option<DirectoryEntry>>;
}

/// 调节中心目录
#[async_trait]
pub trait RegulationCenterDirectory: Send + Sync {
    async fn find_center(&self, center_id: Uuid) -> Result<Option<DirectoryEntry>>;
}

/// 医疗机构目录
#[async_trait]
pub trait FacilityDirectory: Send + Sync {
    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<DirectoryEntry>>;
}

/// 地址 → 坐标
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// 无法解析时返回 Ok(None)
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>>;
}

/// 启动时从存储恢复的状态
#[derive(Debug, Clone, Default)]
pub struct StoredState {
    pub occurrences: Vec<Occurrence>,
    pub vehicles: Vec<Vehicle>,
    pub events: Vec<AuditEvent>,
}

/// 持久化接口；每个已提交的变更在对内存可见之前写入
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save_occurrence(&self, occurrence: &Occurrence, event: &AuditEvent) -> Result<()>;

    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()>;

    /// 派遣类操作同时修改事件与车辆，作为一个单元写入
    async fn save_dispatch(
        &self,
        occurrence: &Occurrence,
        vehicle: &Vehicle,
        event: &AuditEvent,
    ) -> Result<()>;

    async fn load(&self) -> Result<StoredState>;
}

/// 显示用流水号生成器
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    async fn next_code(&self, date: NaiveDate) -> Result<String>;
}

/// 内存目录，供测试和单机部署使用
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    operators: RwLock<HashMap<Uuid, DirectoryEntry>>,
    centers: RwLock<HashMap<Uuid, DirectoryEntry>>,
    facilities: RwLock<HashMap<Uuid, DirectoryEntry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_operator(&self, id: Uuid, name: impl Into<String>) {
        self.operators
            .write()
            .await
            .insert(id, DirectoryEntry::new(id, name));
    }

    pub async fn add_center(&self, id: Uuid, name: impl Into<String>) {
        self.centers
            .write()
            .await
            .insert(id, DirectoryEntry::new(id, name));
    }

    pub async fn add_facility(&self, id: Uuid, name: impl Into<String>) {
        self.facilities
            .write()
            .await
            .insert(id, DirectoryEntry::new(id, name));
    }
}

#[async_trait]
impl OperatorDirectory for InMemoryDirectory {
    async fn find_operator(&self, operator_id: Uuid) -> Result<Option<DirectoryEntry>> {
        Ok(self.operators.read().await.get(&operator_id).cloned())
    }
}

#[async_trait]
impl RegulationCenterDirectory for InMemoryDirectory {
    async fn find_center(&self, center_id: Uuid) -> Result<Option<DirectoryEntry>> {
        Ok(self.centers.read().await.get(&center_id).cloned())
    }
}

#[async_trait]
impl FacilityDirectory for InMemoryDirectory {
    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<DirectoryEntry>> {
        Ok(self.facilities.read().await.get(&facility_id).cloned())
    }
}

/// 不做任何持久化
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl Persistence for NullStore {
    async fn save_occurrence(&self, _occurrence: &Occurrence, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }

    async fn save_vehicle(&self, _vehicle: &Vehicle) -> Result<()> {
        Ok(())
    }

    async fn save_dispatch(
        &self,
        _occurrence: &Occurrence,
        _vehicle: &Vehicle,
        _event: &AuditEvent,
    ) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<StoredState> {
        Ok(StoredState::default())
    }
}

/// 进程内计数器；重启后从头开始，多实例部署时可能重复
#[derive(Debug)]
pub struct LocalSequence {
    counter: AtomicU64,
}

impl LocalSequence {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(last: u64) -> Self {
        Self {
            counter: AtomicU64::new(last),
        }
    }
}

impl Default for LocalSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceGenerator for LocalSequence {
    async fn next_code(&self, date: NaiveDate) -> Result<String> {
        let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format_display_code(date, next))
    }
}

/// 核心运行所需的全部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub operators: Arc<dyn OperatorDirectory>,
    pub centers: Arc<dyn RegulationCenterDirectory>,
    pub facilities: Arc<dyn FacilityDirectory>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
    pub store: Arc<dyn Persistence>,
    pub sequence: Arc<dyn SequenceGenerator>,
}

impl Collaborators {
    /// 以内存目录为基础，不做地理编码与持久化
    pub fn in_memory(directory: Arc<InMemoryDirectory>) -> Self {
        Self {
            operators: directory.clone(),
            centers: directory.clone(),
            facilities: directory,
            geocoder: None,
            store: Arc::new(NullStore),
            sequence: Arc::new(LocalSequence::new()),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Persistence>) -> Self {
        self.store = store;
        self
    }

    pub fn with_sequence(mut self, sequence: Arc<dyn SequenceGenerator>) -> Self {
        self.sequence = sequence;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("geocoder", &self.geocoder.is_some())
            .finish_non_exhaustive()
    }
}
