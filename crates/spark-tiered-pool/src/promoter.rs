use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    error::{PoolError, Result},
    registry::SizeClassRegistry,
};

/// 默认的连续未命中阈值。
pub const DEFAULT_ATTEMPT_THRESHOLD: usize = 10;

/// 一次未命中记录的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissOutcome {
    /// 计数尚未达到阈值。
    Pending { misses: usize },
    /// 达到阈值，已为该尺寸创建专属尺寸类。
    Promoted,
    /// 达到阈值时该尺寸已有精确尺寸类，跳过插入。
    AlreadyRegistered,
}

/// `AdaptivePromoter` 观察近似匹配的未命中，把反复出现的尺寸提升为专属尺寸类。
///
/// # 设计初衷（Why）
/// - 预先为每种可能的尺寸建池会浪费内存与启动成本；
/// - 只有频繁复现的尺寸才值得独立池化，这是基于时间局部性的容量规划启发式，而非错误恢复。
///
/// # 核心机制（How）
/// - 失败账本 `DashMap<usize, usize>` 记录每个规范尺寸的连续未命中次数；
/// - 计数在分片锁内自增并判定阈值，达到阈值的那一次调用负责移除条目并插入尺寸类，
///   并发调用者中只有一个会触发提升；
/// - 阈值为全局设置，不区分尺寸。
///
/// # 契约说明（What）
/// - 账本条目只在计数低于阈值时存在，提升后立即删除；
/// - 提升从不向调用方报错，插入失败（例如尺寸为 0）仅记录日志。
#[derive(Debug)]
pub struct AdaptivePromoter {
    ledger: DashMap<usize, usize>,
    threshold: AtomicUsize,
    promotions: AtomicU64,
}

impl Default for AdaptivePromoter {
    fn default() -> Self {
        Self {
            ledger: DashMap::new(),
            threshold: AtomicUsize::new(DEFAULT_ATTEMPT_THRESHOLD),
            promotions: AtomicU64::new(0),
        }
    }
}

impl AdaptivePromoter {
    /// 以默认阈值创建。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定阈值创建，`threshold == 0` 时报错。
    pub fn with_threshold(threshold: usize) -> Result<Self> {
        let promoter = Self::new();
        promoter.set_attempt_threshold(threshold)?;
        Ok(promoter)
    }

    /// 当前阈值。
    pub fn attempt_threshold(&self) -> usize {
        self.threshold.load(Ordering::Relaxed)
    }

    /// 设置阈值，必须至少为 1。
    pub fn set_attempt_threshold(&self, threshold: usize) -> Result<()> {
        if threshold == 0 {
            return Err(PoolError::InvalidAttemptThreshold);
        }
        self.threshold.store(threshold, Ordering::Relaxed);
        Ok(())
    }

    /// 记录一次 `size` 的未命中，必要时向 `registry` 插入专属尺寸类。
    pub fn record_miss(&self, size: usize, registry: &SizeClassRegistry) -> MissOutcome {
        let threshold = self.attempt_threshold();
        let reached = match self.ledger.entry(size) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += 1;
                let misses = *entry.get();
                if misses >= threshold {
                    entry.remove();
                    None
                } else {
                    Some(misses)
                }
            }
            Entry::Vacant(entry) => {
                if threshold <= 1 {
                    None
                } else {
                    entry.insert(1);
                    Some(1)
                }
            }
        };

        if let Some(misses) = reached {
            tracing::trace!(size, misses, threshold, "size class miss recorded");
            return MissOutcome::Pending { misses };
        }
        self.promote(size, registry)
    }

    /// 尚未达到阈值的尺寸数量。
    pub fn pending(&self) -> usize {
        self.ledger.len()
    }

    /// `size` 当前累计的未命中次数。
    pub fn misses(&self, size: usize) -> usize {
        self.ledger.get(&size).map(|entry| *entry).unwrap_or_default()
    }

    /// 累计提升次数。
    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// 清空失败账本。
    pub fn reset(&self) {
        self.ledger.clear();
    }

    fn promote(&self, size: usize, registry: &SizeClassRegistry) -> MissOutcome {
        match registry.insert_if_absent(size) {
            Ok(true) => {
                self.promotions.fetch_add(1, Ordering::Relaxed);
                tracing::info!(size, "frequently missed size promoted to dedicated pool");
                MissOutcome::Promoted
            }
            Ok(false) => {
                tracing::debug!(size, "promotion skipped, size class already registered");
                MissOutcome::AlreadyRegistered
            }
            Err(err) => {
                tracing::warn!(size, error = %err, "promotion rejected by registry");
                MissOutcome::AlreadyRegistered
            }
        }
    }
}
