//! # SAMU调度模块
//!
//! 提供院前急救事件的完整调度功能，包括：
//! - 事件状态机：管理事件从开立到关闭的生命周期
//! - 医疗调节：调节医生接手事件并对患者进行分级
//! - 车辆派遣：派遣、状态上报、释放与撤回，保证车辆同一时间只执行一个派遣
//! - 审计日志与通知总线：每个变更生成审计事件并推送给订阅方
//! - 运营看板：按时间窗口聚合事件与车队指标

pub mod dashboard;
pub mod dispatch;
pub mod engine;
pub mod event_log;
pub mod notification;
pub mod occurrence;
pub mod regulation;
pub mod settings;
pub mod state_machine;
pub mod vehicle;

// 重新导出主要类型
pub use dashboard::{
    AlertKind, DashboardAggregator, DashboardAlert, DashboardSnapshot, HourlyCount, TimeWindow,
    UrgentOccurrence,
};
pub use dispatch::{DispatchBoard, Milestone};
pub use engine::{DispatchCenter, RestoreSummary};
pub use event_log::EventLog;
pub use notification::{Audience, Notification, NotificationBus, Subscription};
pub use occurrence::{OccurrenceFilter, OccurrenceRegistry};
pub use regulation::{PatientRegulation, RegulationWorkstation};
pub use settings::{DashboardSettings, DispatchSettings, ReadinessSettings};
pub use state_machine::{OccurrenceEvent, OccurrenceStateMachine, VehicleStatusMachine};
pub use vehicle::{Candidate, CandidateQuery, ReadinessPolicy, VehicleFilter, VehicleRegistry};
