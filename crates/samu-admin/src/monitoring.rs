//! 运营指标
//!
//! 把看板快照转换为 Prometheus 指标。

use anyhow::Result;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use samu_core::{OccurrenceState, VehicleStatus};
use samu_dispatch::DashboardSnapshot;

/// 调度指标收集器
#[derive(Debug, Clone)]
pub struct DispatchMetrics {
    /// Prometheus指标注册表
    registry: Registry,
    occurrences_by_state: IntGaugeVec,
    occurrences_by_priority: IntGaugeVec,
    vehicles_by_status: IntGaugeVec,
    vehicle_availability_percent: Gauge,
    average_regulation_minutes: Gauge,
    active_alerts: IntGauge,
    snapshots_total: IntCounter,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("samu".to_string()), None)?;

        let occurrences_by_state = IntGaugeVec::new(
            Opts::new("occurrences", "Occurrences created in the dashboard window by state"),
            &["state"],
        )?;
        let occurrences_by_priority = IntGaugeVec::new(
            Opts::new(
                "occurrences_by_priority",
                "Occurrences created in the dashboard window by priority",
            ),
            &["priority"],
        )?;
        let vehicles_by_status = IntGaugeVec::new(
            Opts::new("vehicles", "Active vehicles by status"),
            &["status"],
        )?;
        let vehicle_availability_percent = Gauge::with_opts(Opts::new(
            "vehicle_availability_percent",
            "Share of active vehicles that are available",
        ))?;
        let average_regulation_minutes = Gauge::with_opts(Opts::new(
            "average_regulation_minutes",
            "Average time from regulation start to finish",
        ))?;
        let active_alerts = IntGauge::with_opts(Opts::new(
            "dashboard_alerts",
            "Alerts raised by the latest dashboard snapshot",
        ))?;
        let snapshots_total = IntCounter::with_opts(Opts::new(
            "dashboard_snapshots_total",
            "Dashboard snapshots observed",
        ))?;

        // 注册所有指标
        registry.register(Box::new(occurrences_by_state.clone()))?;
        registry.register(Box::new(occurrences_by_priority.clone()))?;
        registry.register(Box::new(vehicles_by_status.clone()))?;
        registry.register(Box::new(vehicle_availability_percent.clone()))?;
        registry.register(Box::new(average_regulation_minutes.clone()))?;
        registry.register(Box::new(active_alerts.clone()))?;
        registry.register(Box::new(snapshots_total.clone()))?;

        Ok(Self {
            registry,
            occurrences_by_state,
            occurrences_by_priority,
            vehicles_by_status,
            vehicle_availability_percent,
            average_regulation_minutes,
            active_alerts,
            snapshots_total,
        })
    }

    /// 用看板快照更新指标
    pub fn observe(&self, snapshot: &DashboardSnapshot) {
        for state in OccurrenceState::all() {
            let count = snapshot.occurrences_by_state.get(&state).copied().unwrap_or(0);
            self.occurrences_by_state
                .with_label_values(&[state.as_str()])
                .set(count as i64);
        }
        for (priority, count) in &snapshot.occurrences_by_priority {
            self.occurrences_by_priority
                .with_label_values(&[&priority.level().to_string()])
                .set(*count as i64);
        }
        for status in VehicleStatus::all() {
            let count = snapshot.vehicles_by_status.get(&status).copied().unwrap_or(0);
            self.vehicles_by_status
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }

        self.vehicle_availability_percent
            .set(snapshot.availability_percent);
        self.average_regulation_minutes
            .set(snapshot.average_regulation_minutes.unwrap_or(0.0));
        self.active_alerts.set(snapshot.alerts.len() as i64);
        self.snapshots_total.inc();

        tracing::debug!(
            "Metrics updated: {} vehicles, {:.1}% available, {} alerts",
            snapshot.total_vehicles,
            snapshot.availability_percent,
            snapshot.alerts.len()
        );
    }

    /// 获取Prometheus文本格式指标
    pub fn get_prometheus_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}
