//! 调度核心的运行参数

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 调度核心参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// 地理编码最长等待时间
    pub geocoding_timeout: Duration,
    /// 优先级等级不大于该值时立即通知调节席
    pub urgent_level: u8,
    /// 候选车辆搜索半径（公里）
    pub search_radius_km: f64,
    pub readiness: ReadinessSettings,
    pub notification_capacity: usize,
    pub dashboard: DashboardSettings,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            geocoding_timeout: Duration::from_secs(3),
            urgent_level: 2,
            search_radius_km: 50.0,
            readiness: ReadinessSettings::default(),
            notification_capacity: 1024,
            dashboard: DashboardSettings::default(),
        }
    }
}

/// 就绪度评分中的油量阈值（百分比）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadinessSettings {
    pub fuel_high_percent: f32,
    pub fuel_low_percent: f32,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            fuel_high_percent: 50.0,
            fuel_low_percent: 25.0,
        }
    }
}

/// 看板告警阈值
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DashboardSettings {
    pub regulation_wait_alert_minutes: i64,
    /// 可用车辆比例低于该值时告警（0-1）
    pub availability_alert_ratio: f64,
    pub critical_list_size: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            regulation_wait_alert_minutes: 30,
            availability_alert_ratio: 0.3,
            critical_list_size: 10,
        }
    }
}
