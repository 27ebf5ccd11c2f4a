//! 事件登记
//!
//! 负责事件的创建、患者登记、位置与优先级修改，以及所有事件变更的提交。
//!
//! 每个事件是一个互斥单元（`Arc<Mutex<Occurrence>>`）。变更在副本上完成，
//! 按 校验 → 生成审计事件 → 持久化 → 追加审计 → 替换内存状态 的顺序提交，
//! 任何一步失败时内存状态保持不变。读取方使用已发布的快照，不获取事件锁。

use chrono::{DateTime, Utc};
use samu_core::collaborators::{Collaborators, DirectoryEntry};
use samu_core::{
    AuditEvent, AuditEventKind, Coordinates, NewAuditEvent, NewOccurrence, NewPatient,
    Occurrence, OccurrenceDetail, OccurrenceState, PatientRecord, Priority, Result, SamuError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::event_log::EventLog;
use crate::notification::{Audience, Notification, NotificationBus};
use crate::settings::DispatchSettings;
use crate::state_machine::{OccurrenceEvent, OccurrenceStateMachine};

pub(crate) type Cell<T> = Arc<Mutex<T>>;

/// 事件列表过滤器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceFilter {
    pub states: Option<Vec<OccurrenceState>>,
    pub priorities: Option<Vec<Priority>>,
    pub regulation_center_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for OccurrenceFilter {
    fn default() -> Self {
        Self {
            states: None,
            priorities: None,
            regulation_center_id: None,
            created_from: None,
            created_to: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

impl OccurrenceFilter {
    fn matches(&self, occurrence: &Occurrence) -> bool {
        if let Some(states) = &self.states {
            if !states.contains(&occurrence.state) {
                return false;
            }
        }
        if let Some(priorities) = &self.priorities {
            if !priorities.contains(&occurrence.priority) {
                return false;
            }
        }
        if let Some(center) = self.regulation_center_id {
            if occurrence.regulation_center_id != center {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if occurrence.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if occurrence.created_at > to {
                return false;
            }
        }
        true
    }
}

/// 事件登记
#[derive(Debug)]
pub struct OccurrenceRegistry {
    cells: RwLock<HashMap<Uuid, Cell<Occurrence>>>,
    published: RwLock<HashMap<Uuid, Occurrence>>,
    patient_index: RwLock<HashMap<Uuid, Uuid>>, // patient_id -> occurrence_id
    state_machine: OccurrenceStateMachine,
    event_log: Arc<EventLog>,
    bus: NotificationBus,
    collaborators: Collaborators,
    settings: DispatchSettings,
}

impl OccurrenceRegistry {
    pub fn new(
        event_log: Arc<EventLog>,
        bus: NotificationBus,
        collaborators: Collaborators,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            published: RwLock::new(HashMap::new()),
            patient_index: RwLock::new(HashMap::new()),
            state_machine: OccurrenceStateMachine::new(),
            event_log,
            bus,
            collaborators,
            settings,
        }
    }

    /// 创建事件
    pub async fn create_occurrence(
        &self,
        request: NewOccurrence,
        operator_id: Uuid,
    ) -> Result<Occurrence> {
        request.validate()?;
        let operator = self.operator(operator_id).await?;

        let (Some(priority), Some(center_id)) = (request.priority, request.regulation_center_id)
        else {
            return Err(SamuError::Validation(
                "priority and regulation_center_id are required".to_string(),
            ));
        };
        self.collaborators
            .centers
            .find_center(center_id)
            .await?
            .ok_or_else(|| SamuError::not_found("regulation_center", center_id))?;

        let (coordinates, geocoding_note) = match request.coordinates {
            Some(coordinates) => (Some(coordinates), None),
            None => self.geocode(&request.location_text).await,
        };

        let now = Utc::now();
        let code = self.collaborators.sequence.next_code(now.date_naive()).await?;
        let id = Uuid::new_v4();
        let patients: Vec<PatientRecord> = request
            .patients
            .into_iter()
            .map(|patient| patient.into_record(id, now))
            .collect();

        let occurrence = Occurrence {
            id,
            code,
            call_type: request.call_type,
            state: OccurrenceState::Open,
            priority,
            caller_phone: request.caller_phone,
            caller_name: request.caller_name,
            location_text: request.location_text,
            coordinates,
            description: request.description,
            notes: request.notes.unwrap_or_default(),
            created_at: now,
            closed_at: None,
            state_since: now,
            regulation_center_id: center_id,
            created_by: operator.id,
            regulator_id: None,
            patients,
            assignments: Vec::new(),
        };

        let mut description = format!("Occurrence {} opened by {}", occurrence.code, operator.name);
        let mut payload = serde_json::json!({
            "priority": priority.level(),
            "patients": occurrence.patients.len(),
        });
        if let Some(note) = &geocoding_note {
            description.push_str(&format!(" ({})", note));
            payload["geocoding"] = serde_json::Value::String(note.clone());
        }

        let event = NewAuditEvent::new(id, AuditEventKind::Creation, OccurrenceState::Open, description)
            .by(operator.id, Some(operator.name.clone()))
            .with_payload(payload);
        let event = self.event_log.stamp(event, now).await;

        if let Err(err) = self.collaborators.store.save_occurrence(&occurrence, &event).await {
            tracing::error!("Failed to persist new occurrence {}: {}", occurrence.code, err);
            return Err(err);
        }
        self.event_log.open_stream(id).await;
        self.event_log.append(event.clone()).await?;

        self.cells
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(occurrence.clone())));
        self.publish_snapshot(&occurrence).await;

        let mut audiences = vec![Audience::Dispatch];
        if self.is_urgent(priority) {
            audiences.push(Audience::Regulation);
        }
        self.bus
            .publish(Notification::for_occurrence(&occurrence, &event, audiences));

        tracing::info!(
            "Created occurrence {} ({}) with priority {:?}",
            occurrence.code,
            occurrence.id,
            occurrence.priority
        );
        Ok(occurrence)
    }

    /// 提交调节申请
    pub async fn escalate_to_regulation(
        &self,
        occurrence_id: Uuid,
        operator_id: Uuid,
    ) -> Result<Occurrence> {
        self.apply_transition(
            occurrence_id,
            operator_id,
            OccurrenceEvent::Escalate,
            vec![Audience::Dispatch, Audience::Regulation],
            |occurrence, operator, _now| {
                Ok(NewAuditEvent::new(
                    occurrence.id,
                    AuditEventKind::EscalatedToRegulation,
                    occurrence.state,
                    format!("Escalated to medical regulation by {}", operator.name),
                ))
            },
        )
        .await
    }

    /// 新增患者
    pub async fn add_patient(
        &self,
        occurrence_id: Uuid,
        patient: NewPatient,
        operator_id: Uuid,
    ) -> Result<PatientRecord> {
        patient.validate()?;
        let record = patient.into_record(occurrence_id, Utc::now());
        let patient_id = record.id;

        let occurrence = self
            .apply_update(
                occurrence_id,
                operator_id,
                vec![Audience::Dispatch, Audience::Regulation],
                |occurrence, operator, _now| {
                    ensure_open(occurrence, AuditEventKind::PatientAdded)?;
                    let description = format!(
                        "Patient added by {}: {}",
                        operator.name, record.chief_complaint
                    );
                    occurrence.patients.push(record);
                    Ok(NewAuditEvent::new(
                        occurrence.id,
                        AuditEventKind::PatientAdded,
                        occurrence.state,
                        description,
                    )
                    .for_patient(patient_id))
                },
            )
            .await?;

        occurrence
            .patient(patient_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("patient", patient_id))
    }

    /// 更新事件坐标
    pub async fn update_location(
        &self,
        occurrence_id: Uuid,
        latitude: f64,
        longitude: f64,
        operator_id: Uuid,
    ) -> Result<Occurrence> {
        let coordinates = Coordinates::new(latitude, longitude);
        coordinates.validate()?;

        self.apply_update(
            occurrence_id,
            operator_id,
            vec![Audience::Dispatch],
            |occurrence, operator, _now| {
                ensure_open(occurrence, AuditEventKind::LocationUpdated)?;
                let previous = occurrence.coordinates.replace(coordinates);
                Ok(NewAuditEvent::new(
                    occurrence.id,
                    AuditEventKind::LocationUpdated,
                    occurrence.state,
                    format!("Location updated by {}", operator.name),
                )
                .with_payload(serde_json::json!({
                    "previous": previous,
                    "latitude": latitude,
                    "longitude": longitude,
                })))
            },
        )
        .await
    }

    /// 修改优先级
    pub async fn change_priority(
        &self,
        occurrence_id: Uuid,
        priority: Priority,
        operator_id: Uuid,
    ) -> Result<Occurrence> {
        let urgent = self.is_urgent(priority);
        let mut audiences = vec![Audience::Dispatch];
        if urgent {
            audiences.push(Audience::Regulation);
        }

        self.apply_update(occurrence_id, operator_id, audiences, |occurrence, operator, _now| {
            ensure_open(occurrence, AuditEventKind::PriorityChanged)?;
            if occurrence.priority == priority {
                return Err(SamuError::Validation(format!(
                    "occurrence {} already has priority {:?}",
                    occurrence.code, priority
                )));
            }
            let previous = std::mem::replace(&mut occurrence.priority, priority);
            Ok(NewAuditEvent::new(
                occurrence.id,
                AuditEventKind::PriorityChanged,
                occurrence.state,
                format!(
                    "Priority changed from {:?} to {:?} by {}",
                    previous, priority, operator.name
                ),
            )
            .with_payload(serde_json::json!({
                "from": previous.level(),
                "to": priority.level(),
            })))
        })
        .await
    }

    /// 获取事件当前快照
    pub async fn get(&self, occurrence_id: Uuid) -> Result<Occurrence> {
        self.published
            .read()
            .await
            .get(&occurrence_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("occurrence", occurrence_id))
    }

    /// 事件详情，事件本体与审计轨迹在同一时刻读取
    pub async fn detail(&self, occurrence_id: Uuid) -> Result<OccurrenceDetail> {
        let cell = self.cell(occurrence_id).await?;
        let occurrence = cell.lock().await;
        let events = self.event_log.list_by_occurrence(occurrence_id).await?;
        Ok(OccurrenceDetail {
            occurrence: occurrence.clone(),
            events,
        })
    }

    /// 按过滤条件分页查询，按优先级和创建时间排序
    pub async fn list(&self, filter: &OccurrenceFilter) -> Vec<Occurrence> {
        let published = self.published.read().await;
        let mut items: Vec<&Occurrence> = published.values().filter(|o| filter.matches(o)).collect();

        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);
        items
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// 调节队列：等待调节与调节中的事件
    pub async fn regulation_queue(&self, regulation_center_id: Option<Uuid>) -> Vec<Occurrence> {
        let filter = OccurrenceFilter {
            states: Some(vec![
                OccurrenceState::AwaitingRegulation,
                OccurrenceState::InRegulation,
            ]),
            regulation_center_id,
            limit: Some(usize::MAX),
            ..Default::default()
        };
        self.list(&filter).await
    }

    /// 含危重/高风险患者且未关闭的事件
    pub async fn critical_occurrences(&self) -> Vec<Occurrence> {
        let published = self.published.read().await;
        let mut items: Vec<Occurrence> = published
            .values()
            .filter(|o| !o.state.is_terminal() && o.has_severe_patient())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        items
    }

    /// 全部事件快照
    pub async fn snapshots(&self) -> Vec<Occurrence> {
        self.published.read().await.values().cloned().collect()
    }

    /// 患者所属事件
    pub async fn occurrence_for_patient(&self, patient_id: Uuid) -> Result<Uuid> {
        self.patient_index
            .read()
            .await
            .get(&patient_id)
            .copied()
            .ok_or_else(|| SamuError::not_found("patient", patient_id))
    }

    /// 从存储恢复
    pub async fn restore(&self, occurrences: Vec<Occurrence>) {
        let mut cells = self.cells.write().await;
        for occurrence in occurrences {
            self.publish_snapshot(&occurrence).await;
            cells.insert(occurrence.id, Arc::new(Mutex::new(occurrence)));
        }
        tracing::info!("Restored {} occurrences", cells.len());
    }

    pub(crate) fn is_urgent(&self, priority: Priority) -> bool {
        priority.level() <= self.settings.urgent_level
    }

    pub(crate) fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    pub(crate) fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// 解析操作员，不存在时报错
    pub(crate) async fn operator(&self, operator_id: Uuid) -> Result<DirectoryEntry> {
        self.collaborators
            .operators
            .find_operator(operator_id)
            .await?
            .ok_or_else(|| SamuError::not_found("operator", operator_id))
    }

    pub(crate) async fn cell(&self, occurrence_id: Uuid) -> Result<Cell<Occurrence>> {
        self.cells
            .read()
            .await
            .get(&occurrence_id)
            .cloned()
            .ok_or_else(|| SamuError::not_found("occurrence", occurrence_id))
    }

    /// 按状态机执行一次生命周期转换
    pub(crate) async fn apply_transition<F>(
        &self,
        occurrence_id: Uuid,
        operator_id: Uuid,
        transition: OccurrenceEvent,
        audiences: Vec<Audience>,
        mutate: F,
    ) -> Result<Occurrence>
    where
        F: FnOnce(&mut Occurrence, &DirectoryEntry, DateTime<Utc>) -> Result<NewAuditEvent>,
    {
        let operator = self.operator(operator_id).await?;
        let cell = self.cell(occurrence_id).await?;
        let mut current = cell.lock().await;

        let next_state = self.state_machine.transition(&current.state, &transition)?;
        let now = Utc::now();
        let mut updated = current.clone();
        updated.state = next_state;
        updated.state_since = now;
        let event = mutate(&mut updated, &operator, now)?.by(operator.id, Some(operator.name.clone()));

        self.commit(&mut current, updated, event, now, audiences).await?;
        tracing::info!(
            "Occurrence {} transitioned to {} via {:?}",
            current.code,
            current.state.as_str(),
            transition
        );
        Ok(current.clone())
    }

    /// 不改变生命周期状态的修改
    pub(crate) async fn apply_update<F>(
        &self,
        occurrence_id: Uuid,
        operator_id: Uuid,
        audiences: Vec<Audience>,
        mutate: F,
    ) -> Result<Occurrence>
    where
        F: FnOnce(&mut Occurrence, &DirectoryEntry, DateTime<Utc>) -> Result<NewAuditEvent>,
    {
        let operator = self.operator(operator_id).await?;
        let cell = self.cell(occurrence_id).await?;
        let mut current = cell.lock().await;

        let now = Utc::now();
        let mut updated = current.clone();
        let event = mutate(&mut updated, &operator, now)?.by(operator.id, Some(operator.name.clone()));
        let kind = event.kind;

        self.commit(&mut current, updated, event, now, audiences).await?;
        tracing::info!("Occurrence {} updated: {}", current.code, kind.as_str());
        Ok(current.clone())
    }

    /// 提交：持久化成功并追加审计事件后才替换内存状态
    pub(crate) async fn commit(
        &self,
        current: &mut Occurrence,
        updated: Occurrence,
        event: NewAuditEvent,
        now: DateTime<Utc>,
        audiences: Vec<Audience>,
    ) -> Result<AuditEvent> {
        let event = self.event_log.stamp(event, now).await;
        if let Err(err) = self.collaborators.store.save_occurrence(&updated, &event).await {
            tracing::error!(
                "Failed to persist {} for occurrence {}: {}",
                event.kind.as_str(),
                updated.code,
                err
            );
            return Err(err);
        }
        self.event_log.append(event.clone()).await?;
        self.install(current, updated).await;

        self.bus
            .publish(Notification::for_occurrence(current, &event, audiences));
        Ok(event)
    }

    /// 替换内存状态并发布快照；调用方必须持有事件锁
    pub(crate) async fn install(&self, current: &mut Occurrence, updated: Occurrence) {
        *current = updated;
        self.publish_snapshot(current).await;
    }

    async fn publish_snapshot(&self, occurrence: &Occurrence) {
        {
            let mut index = self.patient_index.write().await;
            for patient in &occurrence.patients {
                index.insert(patient.id, occurrence.id);
            }
        }
        self.published
            .write()
            .await
            .insert(occurrence.id, occurrence.clone());
    }

    /// 地理编码，超时或失败时返回降级说明
    async fn geocode(&self, address: &str) -> (Option<Coordinates>, Option<String>) {
        let Some(geocoder) = &self.collaborators.geocoder else {
            return (None, Some("geocoding unavailable".to_string()));
        };

        let timeout = self.settings.geocoding_timeout;
        match tokio::time::timeout(timeout, geocoder.resolve(address)).await {
            Ok(Ok(Some(coordinates))) if coordinates.is_valid() => (Some(coordinates), None),
            Ok(Ok(Some(coordinates))) => {
                tracing::warn!(
                    "Geocoder returned invalid coordinates {:?} for '{}'",
                    coordinates,
                    address
                );
                (None, Some("geocoder returned invalid coordinates".to_string()))
            }
            Ok(Ok(None)) => {
                tracing::warn!("Address '{}' could not be geocoded", address);
                (None, Some("address could not be geocoded".to_string()))
            }
            Ok(Err(err)) => {
                tracing::warn!("Geocoding failed for '{}': {}", address, err);
                (None, Some(format!("geocoding failed: {}", err)))
            }
            Err(_) => {
                let err = SamuError::UpstreamTimeout(format!(
                    "geocoding did not respond within {} ms",
                    timeout.as_millis()
                ));
                tracing::warn!("{}", err);
                (None, Some(err.to_string()))
            }
        }
    }
}

/// 终态事件不接受修改
pub(crate) fn ensure_open(occurrence: &Occurrence, kind: AuditEventKind) -> Result<()> {
    if occurrence.state.is_terminal() {
        return Err(SamuError::illegal_transition(
            "occurrence",
            occurrence.state,
            kind.as_str(),
        ));
    }
    Ok(())
}
