//! # SAMU管理模块
//!
//! 提供配置管理、日志初始化和运营指标等运维功能

pub mod config;
pub mod logging;
pub mod monitoring;

pub use config::{
    ConfigManager, ConfigValidator, DashboardConfig, DatabaseConfig, DirectoryConfig,
    DirectorySeed, DispatchConfig, GeocodingConfig, LoggingConfig, SamuConfig, ServerConfig,
    WebhookConfig,
};
pub use logging::init_logging;
pub use monitoring::DispatchMetrics;
