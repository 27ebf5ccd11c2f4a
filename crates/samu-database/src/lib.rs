//! # SAMU数据库模块
//!
//! 负责急救事件、车辆与审计轨迹的持久化，提供PostgreSQL连接池、建表与写入操作，
//! 以及基于数据库的显示流水号生成器。

pub mod connection;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::{DatabaseOptions, DatabasePool};
pub use models::*;
pub use queries::DatabaseQueries;
pub use store::PgStore;
