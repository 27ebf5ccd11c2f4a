//! # SAMU
//!
//! 根包，重新导出核心模型与调度引擎，供演示程序使用。

pub use samu_core as core;
pub use samu_dispatch as dispatch;
