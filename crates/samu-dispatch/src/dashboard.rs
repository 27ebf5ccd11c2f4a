//! 看板统计
//!
//! 只读计算：基于已发布的事件/车辆快照和审计日志生成统计与告警，不获取任何实体锁。

use chrono::{DateTime, Duration, DurationRound, Utc};
use samu_core::{
    AuditEvent, AuditEventKind, Occurrence, OccurrenceState, Priority, Vehicle, VehicleStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::event_log::EventLog;
use crate::notification::{Notification, NotificationBus};
use crate::occurrence::OccurrenceRegistry;
use crate::settings::DashboardSettings;
use crate::vehicle::VehicleRegistry;

/// 统计时间窗
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// 截至当前的最近若干小时
    pub fn last_hours(hours: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - Duration::hours(hours),
            to,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// 告警类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertKind {
    RegulationWaitExceeded,
    LowVehicleAvailability,
    VehicleStatusOverdue,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::RegulationWaitExceeded => "regulation-wait-exceeded",
            AlertKind::LowVehicleAvailability => "low-vehicle-availability",
            AlertKind::VehicleStatusOverdue => "vehicle-status-overdue",
        }
    }
}

/// 看板告警
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardAlert {
    pub kind: AlertKind,
    pub message: String,
    pub occurrence_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
}

/// 每小时事件数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub count: usize,
}

/// 紧急事件列表条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrgentOccurrence {
    pub id: Uuid,
    pub code: String,
    pub priority: Priority,
    pub state: OccurrenceState,
    pub location_text: String,
    pub elapsed_minutes: i64,
}

/// 看板快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub window: TimeWindow,
    pub occurrences_by_state: BTreeMap<OccurrenceState, usize>,
    pub occurrences_by_priority: BTreeMap<Priority, usize>,
    pub vehicles_by_status: BTreeMap<VehicleStatus, usize>,
    pub total_vehicles: usize,
    pub availability_percent: f64,
    pub hourly: Vec<HourlyCount>,
    pub most_urgent: Vec<UrgentOccurrence>,
    pub average_regulation_minutes: Option<f64>,
    pub alerts: Vec<DashboardAlert>,
}

/// 看板统计器
#[derive(Debug)]
pub struct DashboardAggregator {
    occurrences: Arc<OccurrenceRegistry>,
    vehicles: Arc<VehicleRegistry>,
    event_log: Arc<EventLog>,
    settings: DashboardSettings,
}

impl DashboardAggregator {
    pub fn new(
        occurrences: Arc<OccurrenceRegistry>,
        vehicles: Arc<VehicleRegistry>,
        event_log: Arc<EventLog>,
        settings: DashboardSettings,
    ) -> Self {
        Self {
            occurrences,
            vehicles,
            event_log,
            settings,
        }
    }

    /// 计算时间窗内的看板快照
    pub async fn snapshot(&self, window: TimeWindow) -> DashboardSnapshot {
        let now = Utc::now();
        let occurrences = self.occurrences.snapshots().await;
        let vehicles = self.vehicles.snapshots().await;
        let regulation_events = self
            .event_log
            .list_by_kinds(
                &[
                    AuditEventKind::RegulationStarted,
                    AuditEventKind::RegulationAborted,
                    AuditEventKind::RegulationFinished,
                ],
                window.from,
            )
            .await;

        aggregate(&self.settings, window, now, &occurrences, &vehicles, &regulation_events)
    }

    /// 将快照中的告警推送到告警受众
    pub fn publish_alerts(snapshot: &DashboardSnapshot, bus: &NotificationBus) -> usize {
        for alert in &snapshot.alerts {
            let mut notification = Notification::alert(
                alert.kind.as_str(),
                serde_json::json!({ "message": alert.message }),
            );
            notification.occurrence_id = alert.occurrence_id;
            notification.vehicle_id = alert.vehicle_id;
            bus.publish(notification);
        }
        snapshot.alerts.len()
    }
}

/// 纯计算部分
pub fn aggregate(
    settings: &DashboardSettings,
    window: TimeWindow,
    now: DateTime<Utc>,
    occurrences: &[Occurrence],
    vehicles: &[Vehicle],
    regulation_events: &[AuditEvent],
) -> DashboardSnapshot {
    let mut occurrences_by_state = BTreeMap::new();
    let mut occurrences_by_priority = BTreeMap::new();
    for occurrence in occurrences.iter().filter(|o| window.contains(o.created_at)) {
        *occurrences_by_state.entry(occurrence.state).or_insert(0) += 1;
        *occurrences_by_priority.entry(occurrence.priority).or_insert(0) += 1;
    }

    let fleet: Vec<&Vehicle> = vehicles.iter().filter(|v| v.active).collect();
    let mut vehicles_by_status = BTreeMap::new();
    for vehicle in &fleet {
        *vehicles_by_status.entry(vehicle.status()).or_insert(0) += 1;
    }
    let available = vehicles_by_status
        .get(&VehicleStatus::Available)
        .copied()
        .unwrap_or(0);
    let availability_percent = if fleet.is_empty() {
        0.0
    } else {
        available as f64 * 100.0 / fleet.len() as f64
    };

    let mut alerts = Vec::new();

    // 等待调节超时
    let mut waiting: Vec<&Occurrence> = occurrences
        .iter()
        .filter(|o| o.state == OccurrenceState::AwaitingRegulation)
        .filter(|o| (now - o.state_since).num_minutes() > settings.regulation_wait_alert_minutes)
        .collect();
    waiting.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.state_since.cmp(&b.state_since)));
    for occurrence in waiting {
        alerts.push(DashboardAlert {
            kind: AlertKind::RegulationWaitExceeded,
            message: format!(
                "Occurrence {} awaiting regulation for {} minutes",
                occurrence.code,
                (now - occurrence.state_since).num_minutes()
            ),
            occurrence_id: Some(occurrence.id),
            vehicle_id: None,
        });
    }

    // 可用车辆比例过低
    if !fleet.is_empty() && availability_percent < settings.availability_alert_ratio * 100.0 {
        alerts.push(DashboardAlert {
            kind: AlertKind::LowVehicleAvailability,
            message: format!(
                "Only {} of {} vehicles available ({:.0}%)",
                available,
                fleet.len(),
                availability_percent
            ),
            occurrence_id: None,
            vehicle_id: None,
        });
    }

    // 车辆在当前状态停留过久
    for vehicle in &fleet {
        let status = vehicle.status();
        if let Some(limit) = status.max_dwell_minutes() {
            let dwell = (now - vehicle.status_since).num_minutes();
            if dwell > limit {
                alerts.push(DashboardAlert {
                    kind: AlertKind::VehicleStatusOverdue,
                    message: format!(
                        "Vehicle {} in {} for {} minutes (limit {})",
                        vehicle.plate,
                        status.as_str(),
                        dwell,
                        limit
                    ),
                    occurrence_id: vehicle.duty.map(|d| d.occurrence_id),
                    vehicle_id: Some(vehicle.id),
                });
            }
        }
    }

    let mut urgent: Vec<&Occurrence> = occurrences
        .iter()
        .filter(|o| !o.state.is_terminal())
        .collect();
    urgent.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
    let most_urgent = urgent
        .into_iter()
        .take(settings.critical_list_size)
        .map(|o| UrgentOccurrence {
            id: o.id,
            code: o.code.clone(),
            priority: o.priority,
            state: o.state,
            location_text: o.location_text.clone(),
            elapsed_minutes: (now - o.created_at).num_minutes(),
        })
        .collect();

    DashboardSnapshot {
        generated_at: now,
        window,
        occurrences_by_state,
        occurrences_by_priority,
        vehicles_by_status,
        total_vehicles: fleet.len(),
        availability_percent,
        hourly: hourly_counts(occurrences, now),
        most_urgent,
        average_regulation_minutes: average_regulation_minutes(regulation_events),
        alerts,
    }
}

/// 最近 24 小时每小时的新建事件数，最早的小时在前
fn hourly_counts(occurrences: &[Occurrence], now: DateTime<Utc>) -> Vec<HourlyCount> {
    let current_hour = now
        .duration_trunc(Duration::hours(1))
        .unwrap_or(now);
    let first_hour = current_hour - Duration::hours(23);

    let mut buckets: Vec<HourlyCount> = (0..24)
        .map(|i| HourlyCount {
            hour: first_hour + Duration::hours(i),
            count: 0,
        })
        .collect();

    for occurrence in occurrences {
        if occurrence.created_at < first_hour || occurrence.created_at > now {
            continue;
        }
        let index = (occurrence.created_at - first_hour).num_hours() as usize;
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.count += 1;
        }
    }
    buckets
}

/// 由 开始调节 → 结束调节 事件对计算平均调节时长；中止会丢弃未完成的开始
fn average_regulation_minutes(events: &[AuditEvent]) -> Option<f64> {
    let mut started: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
    let mut durations = Vec::new();

    for event in events {
        match event.kind {
            AuditEventKind::RegulationStarted => {
                started.insert(event.occurrence_id, event.timestamp);
            }
            AuditEventKind::RegulationAborted => {
                started.remove(&event.occurrence_id);
            }
            AuditEventKind::RegulationFinished => {
                if let Some(start) = started.remove(&event.occurrence_id) {
                    durations.push((event.timestamp - start).num_seconds() as f64 / 60.0);
                }
            }
            _ => {}
        }
    }

    if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    }
}
