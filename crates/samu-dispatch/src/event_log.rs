//! 审计日志
//!
//! 每个事件一条只追加的审计流。事件按 (时间戳, 插入序号) 全序排列。

use chrono::{DateTime, Utc};
use samu_core::{AuditEvent, AuditEventKind, NewAuditEvent, Result, SamuError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// 只追加的审计日志
#[derive(Debug, Default)]
pub struct EventLog {
    streams: RwLock<HashMap<Uuid, Vec<AuditEvent>>>,
    sequence: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新事件开启审计流
    pub async fn open_stream(&self, occurrence_id: Uuid) {
        self.streams
            .write()
            .await
            .entry(occurrence_id)
            .or_insert_with(Vec::new);
    }

    /// 为待写入事件分配标识、序号和时间戳。
    /// 时间戳不早于该事件流中最后一条记录。
    pub async fn stamp(&self, event: NewAuditEvent, at: DateTime<Utc>) -> AuditEvent {
        let last = self
            .streams
            .read()
            .await
            .get(&event.occurrence_id)
            .and_then(|events| events.last().map(|e| e.timestamp));
        let timestamp = match last {
            Some(last) if last > at => last,
            _ => at,
        };

        AuditEvent {
            id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            occurrence_id: event.occurrence_id,
            kind: event.kind,
            description: event.description,
            operator_id: event.operator_id,
            operator_name: event.operator_name,
            assignment_id: event.assignment_id,
            patient_id: event.patient_id,
            occurrence_state: event.occurrence_state,
            timestamp,
            payload: event.payload,
        }
    }

    /// 追加事件；仅在事件流不存在时失败
    pub async fn append(&self, event: AuditEvent) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams
            .get_mut(&event.occurrence_id)
            .ok_or_else(|| SamuError::not_found("occurrence", event.occurrence_id))?;

        tracing::debug!(
            "Audit event {} ({}) appended to occurrence {}",
            event.sequence,
            event.kind.as_str(),
            event.occurrence_id
        );
        stream.push(event);
        Ok(())
    }

    /// 按全序列出事件的所有审计记录
    pub async fn list_by_occurrence(&self, occurrence_id: Uuid) -> Result<Vec<AuditEvent>> {
        let streams = self.streams.read().await;
        let stream = streams
            .get(&occurrence_id)
            .ok_or_else(|| SamuError::not_found("occurrence", occurrence_id))?;
        Ok(Self::ordered(stream.iter().cloned().collect()))
    }

    /// 某次派遣相关的审计记录
    pub async fn list_by_assignment(&self, occurrence_id: Uuid, assignment_id: Uuid) -> Result<Vec<AuditEvent>> {
        let events = self.list_by_occurrence(occurrence_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.assignment_id == Some(assignment_id))
            .collect())
    }

    /// 某个患者相关的审计记录
    pub async fn list_by_patient(&self, occurrence_id: Uuid, patient_id: Uuid) -> Result<Vec<AuditEvent>> {
        let events = self.list_by_occurrence(occurrence_id).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.patient_id == Some(patient_id))
            .collect())
    }

    /// 指定时间之后的某类记录，跨所有事件
    pub async fn list_by_kinds(
        &self,
        kinds: &[AuditEventKind],
        since: DateTime<Utc>,
    ) -> Vec<AuditEvent> {
        let streams = self.streams.read().await;
        let events = streams
            .values()
            .flatten()
            .filter(|e| e.timestamp >= since && kinds.contains(&e.kind))
            .cloned()
            .collect();
        Self::ordered(events)
    }

    /// 从存储恢复；序号从已有最大值继续
    pub async fn restore(&self, occurrence_ids: &[Uuid], events: Vec<AuditEvent>) {
        let mut streams = self.streams.write().await;
        for id in occurrence_ids {
            streams.entry(*id).or_insert_with(Vec::new);
        }

        let max_sequence = events.iter().map(|e| e.sequence).max().unwrap_or(0);
        for event in events {
            streams
                .entry(event.occurrence_id)
                .or_insert_with(Vec::new)
                .push(event);
        }
        for stream in streams.values_mut() {
            stream.sort_by(|a, b| (a.timestamp, a.sequence).cmp(&(b.timestamp, b.sequence)));
        }
        self.sequence.fetch_max(max_sequence, Ordering::SeqCst);
    }

    pub async fn total_events(&self) -> usize {
        self.streams.read().await.values().map(|s| s.len()).sum()
    }

    fn ordered(mut events: Vec<AuditEvent>) -> Vec<AuditEvent> {
        events.sort_by(|a, b| (a.timestamp, a.sequence).cmp(&(b.timestamp, b.sequence)));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use samu_core::OccurrenceState;

    fn event(occurrence_id: Uuid, kind: AuditEventKind) -> NewAuditEvent {
        NewAuditEvent::new(occurrence_id, kind, OccurrenceState::Open, kind.as_str())
    }

    #[tokio::test]
    async fn test_append_requires_stream() {
        let log = EventLog::new();
        let occurrence_id = Uuid::new_v4();

        let stamped = log
            .stamp(event(occurrence_id, AuditEventKind::Creation), Utc::now())
            .await;
        assert!(matches!(
            log.append(stamped.clone()).await,
            Err(SamuError::ReferenceNotFound { .. })
        ));

        log.open_stream(occurrence_id).await;
        log.append(stamped).await.unwrap();
        assert_eq!(log.list_by_occurrence(occurrence_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_total_order_with_clock_skew() {
        let log = EventLog::new();
        let occurrence_id = Uuid::new_v4();
        log.open_stream(occurrence_id).await;

        let now = Utc::now();
        let first = log
            .stamp(event(occurrence_id, AuditEventKind::Creation), now)
            .await;
        log.append(first).await.unwrap();

        // 时钟回拨时不早于上一条
        let second = log
            .stamp(
                event(occurrence_id, AuditEventKind::PatientAdded),
                now - Duration::seconds(5),
            )
            .await;
        assert_eq!(second.timestamp, now);
        log.append(second).await.unwrap();

        let kinds: Vec<_> = log
            .list_by_occurrence(occurrence_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![AuditEventKind::Creation, AuditEventKind::PatientAdded]);
    }

    #[tokio::test]
    async fn test_list_by_sub_entity() {
        let log = EventLog::new();
        let occurrence_id = Uuid::new_v4();
        let assignment_id = Uuid::new_v4();
        log.open_stream(occurrence_id).await;

        let assigned = log
            .stamp(
                event(occurrence_id, AuditEventKind::VehicleAssigned).for_assignment(assignment_id),
                Utc::now(),
            )
            .await;
        log.append(assigned).await.unwrap();
        let other = log
            .stamp(event(occurrence_id, AuditEventKind::PatientAdded), Utc::now())
            .await;
        log.append(other).await.unwrap();

        let events = log
            .list_by_assignment(occurrence_id, assignment_id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AuditEventKind::VehicleAssigned);
    }

    #[tokio::test]
    async fn test_restore_continues_sequence() {
        let log = EventLog::new();
        let occurrence_id = Uuid::new_v4();
        let mut restored = log
            .stamp(event(occurrence_id, AuditEventKind::Creation), Utc::now())
            .await;
        restored.sequence = 41;

        let fresh = EventLog::new();
        fresh.restore(&[occurrence_id], vec![restored]).await;
        let next = fresh
            .stamp(event(occurrence_id, AuditEventKind::Closed), Utc::now())
            .await;
        assert_eq!(next.sequence, 42);
    }
}
