use crate::{normalize::Tier, object_pool::BufferPoolStats};

/// 单个尺寸类的统计。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeClassStats {
    pub size: usize,
    pub tier: Tier,
    pub pool: BufferPoolStats,
}

/// 分级缓冲池的整体统计快照。
///
/// # 契约说明（What）
/// - `pooled_serves` / `unpooled_serves`：`serve` 命中尺寸类与走非池化路径的次数；
/// - `promotions`：自适应提升新增的尺寸类数量；
/// - `pending_misses`：失败账本中尚未达到阈值的尺寸数量；
/// - `classes`：按尺寸升序排列的各尺寸类统计，取自同一注册表快照。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TieredPoolStats {
    pub pooled_serves: u64,
    pub unpooled_serves: u64,
    pub promotions: u64,
    pub pending_misses: usize,
    pub classes: Vec<SizeClassStats>,
}

impl TieredPoolStats {
    /// 命中率（0.0 到 1.0），尚无请求时为 0。
    pub fn hit_rate(&self) -> f64 {
        let total = self.pooled_serves + self.unpooled_serves;
        if total == 0 {
            0.0
        } else {
            self.pooled_serves as f64 / total as f64
        }
    }

    /// 所有尺寸类尚未归还的租约总数。
    pub fn active_leases(&self) -> usize {
        self.classes.iter().map(|class| class.pool.active_leases).sum()
    }

    /// 按尺寸查找尺寸类统计。
    pub fn class(&self, size: usize) -> Option<&SizeClassStats> {
        self.classes.iter().find(|class| class.size == size)
    }
}
