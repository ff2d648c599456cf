//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义分级缓冲池在配置阶段可能出现的错误；
//! - 运行期的 `serve` 不产生本模块错误：调用方回调的错误类型原样透传，
//!   尺寸类提升属于容量规划启发式，也从不向调用方报错。
//!
//! ## 设计要求（What）
//! - 所有错误派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - 变体实现 `Clone + Eq`，便于测试逐一比对；
//! - 池对象的“形状不匹配”在 Rust 中由类型系统静态排除，因此没有对应变体。

use thiserror::Error;

use crate::normalize::{MAX_UNITS_PER_TIER, Tier};

/// 分级缓冲池的配置错误域。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// 注册尺寸类时单位数越界。
    ///
    /// - **契约 (What)**：`units` 必须位于 `1..1024`；`tier` 指明换算单位；
    /// - **处理建议**：同步返回、不重试，调用方需修正配置值。
    #[error("invalid {tier} unit count {units}: expected 1..{max}", max = MAX_UNITS_PER_TIER)]
    InvalidSize { tier: Tier, units: usize },

    /// 尺寸类字节数为 0。
    #[error("size class must be a positive byte count")]
    ZeroSizeClass,

    /// 连续未命中阈值为 0。
    #[error("attempt threshold must be at least 1")]
    InvalidAttemptThreshold,

    /// 单个尺寸类的空闲缓冲上限为 0，池将无法缓存任何缓冲。
    #[error("max idle buffers per size class must be at least 1")]
    InvalidMaxIdle,
}

/// 缓冲池统一的 `Result` 别名，默认错误类型为 [`PoolError`]。
pub type Result<T, E = PoolError> = core::result::Result<T, E>;
