//! # SAMU Core
//!
//! SAMU急救调度系统的核心模块，提供基础数据结构、错误定义、外部协作方接口和通用工具。

pub mod collaborators;
pub mod error;
pub mod fleet;
pub mod models;
pub mod utils;

pub use error::{Result, SamuError};
pub use fleet::*;
pub use models::*;
