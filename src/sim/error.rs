//! 仿真核心错误类型

use super::time::TimeUnit;
use thiserror::Error;

/// 仿真核心错误：配置类错误在构造期即失败，运行不会开始。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// 调度延迟为负
    #[error("negative schedule delay: {delay_count} (resolution units)")]
    InvalidDelay { delay_count: i64 },

    /// 时间精度已被观察并冻结，不允许再修改
    #[error("time resolution is frozen and cannot be changed")]
    ResolutionFrozen,

    /// 从细粒度单位转换到粗粒度单位会丢失精度
    #[error("converting {count} {from:?} to {to:?} loses precision")]
    ResolutionConflict {
        count: i64,
        from: TimeUnit,
        to: TimeUnit,
    },
}
