//! 分级缓冲池的配置结构。
//!
//! # 设计初衷（Why）
//! - 库本身不读取文件或环境变量；宿主把本结构嵌入自己的配置文件，
//!   经 `serde` 反序列化后交给 [`TieredPool::from_config`](crate::TieredPool::from_config)。
//! - `gap_tolerance` 的合理取值取决于业务负载，没有放之四海皆准的默认值，
//!   因此它是唯一的必填字段，缺失时反序列化失败。
//!
//! # 契约说明（What）
//! - `attempt_threshold >= 1`，默认 [`DEFAULT_ATTEMPT_THRESHOLD`]；
//! - `max_idle_per_class >= 1`，默认 [`DEFAULT_MAX_IDLE`]；
//! - 单位列表中的每个值必须位于 `1..1024`。

use serde::{Deserialize, Serialize};

use crate::{
    error::{PoolError, Result},
    normalize::Tier,
    object_pool::DEFAULT_MAX_IDLE,
    promoter::DEFAULT_ATTEMPT_THRESHOLD,
};

/// 分级缓冲池配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TieredPoolConfig {
    /// 近似匹配允许的最大松弛（字节，严格小于）。
    pub gap_tolerance: usize,
    /// 触发提升所需的连续未命中次数。
    #[serde(default = "default_attempt_threshold")]
    pub attempt_threshold: usize,
    /// 每个尺寸类缓存的空闲缓冲上限。
    #[serde(default = "default_max_idle")]
    pub max_idle_per_class: usize,
    /// 预注册的小单位尺寸类（KiB 数）。
    #[serde(default)]
    pub small_unit_classes: Vec<usize>,
    /// 预注册的大单位尺寸类（MiB 数）。
    #[serde(default)]
    pub large_unit_classes: Vec<usize>,
}

fn default_attempt_threshold() -> usize {
    DEFAULT_ATTEMPT_THRESHOLD
}

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE
}

impl TieredPoolConfig {
    /// 以必填的容差创建配置，其余字段取默认值。
    pub fn new(gap_tolerance: usize) -> Self {
        Self {
            gap_tolerance,
            attempt_threshold: DEFAULT_ATTEMPT_THRESHOLD,
            max_idle_per_class: DEFAULT_MAX_IDLE,
            small_unit_classes: Vec::new(),
            large_unit_classes: Vec::new(),
        }
    }

    pub fn with_attempt_threshold(mut self, threshold: usize) -> Self {
        self.attempt_threshold = threshold;
        self
    }

    pub fn with_max_idle_per_class(mut self, max_idle: usize) -> Self {
        self.max_idle_per_class = max_idle;
        self
    }

    pub fn with_small_unit_classes(mut self, units: impl Into<Vec<usize>>) -> Self {
        self.small_unit_classes = units.into();
        self
    }

    pub fn with_large_unit_classes(mut self, units: impl Into<Vec<usize>>) -> Self {
        self.large_unit_classes = units.into();
        self
    }

    /// 校验全部字段；返回遇到的第一个错误。
    pub fn validate(&self) -> Result<()> {
        if self.attempt_threshold == 0 {
            return Err(PoolError::InvalidAttemptThreshold);
        }
        if self.max_idle_per_class == 0 {
            return Err(PoolError::InvalidMaxIdle);
        }
        class_sizes(Tier::SmallUnit, &self.small_unit_classes)?;
        class_sizes(Tier::LargeUnit, &self.large_unit_classes)?;
        Ok(())
    }
}

/// 把单位列表换算为字节数；任一单位越界则整体失败，不产生部分结果。
pub(crate) fn class_sizes(tier: Tier, units: &[usize]) -> Result<Vec<usize>> {
    units.iter().map(|&n| tier.class_size(n)).collect()
}
