//! 尺寸归一化：把任意请求字节数映射到规范的尺寸类边界。
//!
//! # 设计初衷（Why）
//! - 请求尺寸千差万别，若逐字节建池将导致池数量失控；
//!   归一化后，相近请求落到同一边界，复用率随之提升。
//!
//! # 规则（What）
//! - `< 1 MiB`：向上取整到 1 KiB 的倍数；
//! - `>= 1 MiB`：向上取整到 1 MiB 的倍数；
//! - 每个层级最多 1024 个单位，因此最大规范尺寸为 1024 MiB；
//!   超出覆盖范围的请求原样返回，永远不会命中任何已注册的尺寸类。

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// 1 KiB。
pub const KIB: usize = 1 << 10;

/// 1 MiB，同时也是大单位层级的起点。
pub const MIB: usize = 1 << 20;

/// 每个层级允许的单位数上限（不含）。
pub const MAX_UNITS_PER_TIER: usize = 1 << 10;

/// 大单位层级的下界 `T`：`size >= T` 的尺寸类属于大单位层级。
pub const LARGE_TIER_THRESHOLD: usize = MIB;

/// 可表示的最大规范尺寸（1024 MiB）。
pub const MAX_CANONICAL_SIZE: usize = MAX_UNITS_PER_TIER * MIB;

/// 尺寸类所在的层级。
///
/// 注册表按层级划分有序序列，查找只在请求所属的层级内进行，
/// 以此把扫描成本限制在单个层级的长度之内。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// 小单位层级：`size < 1 MiB`，以 KiB 计。
    SmallUnit,
    /// 大单位层级：`size >= 1 MiB`，以 MiB 计。
    LargeUnit,
}

impl Tier {
    /// 判定字节数所属的层级。
    pub const fn of(size: usize) -> Self {
        if size >= LARGE_TIER_THRESHOLD {
            Tier::LargeUnit
        } else {
            Tier::SmallUnit
        }
    }

    /// 层级的单位字节数。
    pub const fn unit(self) -> usize {
        match self {
            Tier::SmallUnit => KIB,
            Tier::LargeUnit => MIB,
        }
    }

    /// 把单位数换算为字节数。
    ///
    /// # 契约说明（What）
    /// - `units` 必须位于 `1..MAX_UNITS_PER_TIER`；
    /// - 越界时返回 [`PoolError::InvalidSize`]，调用方需修正配置后重试。
    pub fn class_size(self, units: usize) -> Result<usize> {
        if units == 0 || units >= MAX_UNITS_PER_TIER {
            return Err(PoolError::InvalidSize { tier: self, units });
        }
        Ok(units * self.unit())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::SmallUnit => f.write_str("small-unit"),
            Tier::LargeUnit => f.write_str("large-unit"),
        }
    }
}

/// 将请求字节数归一化为规范尺寸类边界。
///
/// # 逻辑解析（How）
/// 1. 超过 [`MAX_CANONICAL_SIZE`] 的请求不在覆盖范围内，原样返回；
/// 2. 否则按请求所属层级的单位向上取整。`1 MiB - 1` 这类请求取整后恰好落在 1 MiB，
///    即大单位层级的第一个边界，结果依旧对齐，因此满足幂等。
///
/// # 契约说明（What）
/// - 纯函数、确定性、幂等：`normalize(normalize(x)) == normalize(x)`；
/// - 对覆盖范围内的输入，结果总是 `>= size` 且与所在层级单位对齐；
/// - `normalize(0) == 0`。
pub const fn normalize(size: usize) -> usize {
    if size > MAX_CANONICAL_SIZE {
        return size;
    }
    let unit = Tier::of(size).unit();
    size.div_ceil(unit) * unit
}
