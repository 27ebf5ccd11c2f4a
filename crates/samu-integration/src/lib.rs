//! # SAMU集成模块
//!
//! 提供与外部系统的集成功能，包括：
//! - HTTP地址解析服务，把呼叫地址解析为坐标
//! - Webhook通知转发，把调度通知实时推送给外部系统

pub mod geocoding;
pub mod webhook;

pub use geocoding::{parse_search_response, HttpGeocoder, HttpGeocoderConfig};
pub use webhook::{WebhookManager, WebhookSubscription, WebhookSubscriptionRequest};
