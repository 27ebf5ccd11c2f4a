//! 通知总线
//!
//! 基于 tokio broadcast 通道的发布/订阅。发布从不阻塞，也不会因订阅方缓慢或断开而失败；
//! 落后的订阅方会丢失最早的消息。

use chrono::{DateTime, Utc};
use samu_core::{AuditEvent, Occurrence, Priority, Vehicle};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 1024;

/// 通知受众
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Audience {
    Dispatch,   // 调度屏
    Regulation, // 医疗调节队列
    Fleet,      // 车队管理
    Alerts,     // 看板告警
}

impl Audience {
    pub fn all() -> Vec<Audience> {
        vec![
            Audience::Dispatch,
            Audience::Regulation,
            Audience::Fleet,
            Audience::Alerts,
        ]
    }
}

/// 推送给订阅方的消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub audiences: Vec<Audience>,
    pub kind: String,
    pub occurrence_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    /// 新的状态（事件状态或车辆状态）
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl Notification {
    /// 由审计事件生成的事件通知
    pub fn for_occurrence(
        occurrence: &Occurrence,
        event: &AuditEvent,
        audiences: Vec<Audience>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            audiences,
            kind: event.kind.as_str().to_string(),
            occurrence_id: Some(occurrence.id),
            vehicle_id: None,
            status: Some(occurrence.state.as_str().to_string()),
            priority: Some(occurrence.priority),
            timestamp: event.timestamp,
            payload: serde_json::json!({
                "code": occurrence.code,
                "description": event.description,
            }),
        }
    }

    /// 车辆状态通知
    pub fn for_vehicle(vehicle: &Vehicle, kind: &str, audiences: Vec<Audience>) -> Self {
        Self {
            id: Uuid::new_v4(),
            audiences,
            kind: kind.to_string(),
            occurrence_id: vehicle.duty.map(|duty| duty.occurrence_id),
            vehicle_id: Some(vehicle.id),
            status: Some(vehicle.status().as_str().to_string()),
            priority: None,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "plate": vehicle.plate,
                "type": vehicle.vehicle_type,
            }),
        }
    }

    /// 看板告警
    pub fn alert(kind: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            audiences: vec![Audience::Alerts],
            kind: kind.to_string(),
            occurrence_id: None,
            vehicle_id: None,
            status: None,
            priority: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: Uuid) -> Self {
        self.vehicle_id = Some(vehicle_id);
        self
    }

    pub fn is_for(&self, audience: Audience) -> bool {
        self.audiences.contains(&audience)
    }
}

/// 通知总线
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布通知，返回收到通知的订阅方数量
    pub fn publish(&self, notification: Notification) -> usize {
        match self.sender.send(notification) {
            Ok(count) => count,
            Err(err) => {
                tracing::debug!("No subscribers for notification {}", err.0.kind);
                0
            }
        }
    }

    /// 订阅指定受众的通知
    pub fn subscribe(&self, audiences: &[Audience]) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            audiences: audiences.iter().copied().collect(),
        }
    }

    /// 订阅全部通知
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(&Audience::all())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// 按受众过滤的订阅
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
    audiences: HashSet<Audience>,
}

impl Subscription {
    /// 等待下一条匹配的通知；总线关闭时返回 None
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => {
                    if self.matches(&notification) {
                        return Some(notification);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification subscriber lagged, {} messages dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞读取下一条匹配的通知
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => {
                    if self.matches(&notification) {
                        return Some(notification);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification subscriber lagged, {} messages dropped", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, notification: &Notification) -> bool {
        notification
            .audiences
            .iter()
            .any(|audience| self.audiences.contains(audience))
    }
}
