//! 尺寸类注册表：有序、分层、写时复制。
//!
//! # 模块角色（Why）
//! - 维护按 `size` 升序排列的尺寸类序列，每个尺寸类绑定一个 [`BufferPool`]；
//! - 序列在逻辑上分为小单位层级与大单位层级，并缓存大单位层级首元素的下标，
//!   精确查找与近似匹配都只扫描请求所属的层级。
//!
//! # 核心机制（How）
//! - 已发布的 [`ClassTable`] 不可变，读者通过 `ArcSwap` 无锁获取快照；
//! - 写者在 `parking_lot::Mutex` 下串行化：克隆当前表、修改副本、原子发布。
//!   请求路径上的自适应提升会触发写入，读者因此只会看到旧表或新表，绝不会看到半成品；
//! - 层级边界用下标而非引用表示，插入时按规则平移，不依赖任何地址稳定性。
//!
//! # 契约说明（What）
//! - 序列始终严格升序，`size` 唯一；
//! - `large_start` 恒等于第一个 `size >= LARGE_TIER_THRESHOLD` 的下标，大单位层级为空时为 `None`；
//! - 尺寸类只能整体清空，不支持单独删除。

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::{
    error::{PoolError, Result},
    normalize::{KIB, LARGE_TIER_THRESHOLD, Tier},
    object_pool::{BufferPool, DEFAULT_MAX_IDLE},
};

/// 注册表初始化时自带的默认尺寸类（1 KiB）。
pub const DEFAULT_CLASS_SIZE: usize = KIB;

/// 一个尺寸类：规范边界与其专属缓冲池。
#[derive(Clone, Debug)]
pub struct SizeClass {
    size: usize,
    pool: Arc<BufferPool>,
}

impl SizeClass {
    /// 尺寸类字节数。
    pub fn size(&self) -> usize {
        self.size
    }

    /// 所属层级。
    pub fn tier(&self) -> Tier {
        Tier::of(self.size)
    }

    /// 绑定的缓冲池。
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

/// `insert` 的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 新增了一个尺寸类。
    Inserted,
    /// 已存在同尺寸的类，仅替换其池绑定。
    Replaced,
}

/// 某一时刻的有序尺寸类表。
#[derive(Clone, Debug, Default)]
struct ClassTable {
    classes: Vec<SizeClass>,
    large_start: Option<usize>,
}

impl ClassTable {
    /// `size` 所属层级对应的切片。
    fn tier_slice(&self, tier: Tier) -> &[SizeClass] {
        let split = self.large_start.unwrap_or(self.classes.len());
        match tier {
            Tier::SmallUnit => &self.classes[..split],
            Tier::LargeUnit => &self.classes[split..],
        }
    }

    fn lookup_exact(&self, size: usize) -> Option<&SizeClass> {
        let tier = self.tier_slice(Tier::of(size));
        tier.binary_search_by_key(&size, SizeClass::size)
            .ok()
            .map(|index| &tier[index])
    }

    /// 层级内第一个 `entry.size >= size` 的尺寸类；若其松弛量不小于容差则视为未命中。
    ///
    /// 层级已升序排列，第一个满足 `>= size` 的元素同时也是松弛量最小的元素，
    /// 因此它不满足容差时，后续元素也不可能满足。
    fn nearest_fit(&self, size: usize, gap_tolerance: usize) -> Option<&SizeClass> {
        let tier = self.tier_slice(Tier::of(size));
        let index = tier.partition_point(|class| class.size < size);
        tier.get(index)
            .filter(|class| class.size - size < gap_tolerance)
    }

    fn upsert(&mut self, size: usize, pool: Arc<BufferPool>) -> InsertOutcome {
        let index = match self.classes.binary_search_by_key(&size, SizeClass::size) {
            Ok(index) => {
                self.classes[index].pool = pool;
                return InsertOutcome::Replaced;
            }
            Err(index) => index,
        };
        self.classes.insert(index, SizeClass { size, pool });

        // 平移层级边界：新元素若属于大单位层级且排在原边界之前（或原边界为空），成为新的首元素；
        // 若属于小单位层级，则原边界整体后移一位。
        self.large_start = match (Tier::of(size), self.large_start) {
            (Tier::LargeUnit, None) => Some(index),
            (Tier::LargeUnit, Some(start)) => Some(start.min(index)),
            (Tier::SmallUnit, Some(start)) => Some(start + 1),
            (Tier::SmallUnit, None) => None,
        };
        debug_assert_eq!(self.large_start, self.recompute_boundary());
        InsertOutcome::Inserted
    }

    fn recompute_boundary(&self) -> Option<usize> {
        let index = self
            .classes
            .partition_point(|class| class.size < LARGE_TIER_THRESHOLD);
        (index < self.classes.len()).then_some(index)
    }
}

/// 分层的尺寸类注册表。
///
/// # 契约说明（What）
/// - 所有方法均可在多线程间并发调用；写操作互斥，读操作无锁；
/// - `gap_tolerance` 为近似匹配允许的最大松弛（严格小于），构造时必须显式给出；
/// - 由注册表自行构造的池使用 `max_idle` 作为空闲上限。
pub struct SizeClassRegistry {
    table: ArcSwap<ClassTable>,
    writer: Mutex<()>,
    gap_tolerance: AtomicUsize,
    max_idle: usize,
}

impl SizeClassRegistry {
    /// 创建仅含默认 1 KiB 尺寸类的注册表。
    pub fn new(gap_tolerance: usize) -> Self {
        Self::with_max_idle(gap_tolerance, DEFAULT_MAX_IDLE)
    }

    /// 创建仅含默认 1 KiB 尺寸类的注册表，并指定自建池的空闲上限。
    pub fn with_max_idle(gap_tolerance: usize, max_idle: usize) -> Self {
        let mut table = ClassTable::default();
        table.upsert(
            DEFAULT_CLASS_SIZE,
            Arc::new(BufferPool::with_max_idle(DEFAULT_CLASS_SIZE, max_idle)),
        );
        Self {
            table: ArcSwap::from_pointee(table),
            writer: Mutex::new(()),
            gap_tolerance: AtomicUsize::new(gap_tolerance),
            max_idle,
        }
    }

    /// 当前近似匹配容差（字节）。
    pub fn gap_tolerance(&self) -> usize {
        self.gap_tolerance.load(Ordering::Relaxed)
    }

    /// 调整近似匹配容差，对后续查找立即生效。
    pub fn set_gap_tolerance(&self, bytes: usize) {
        self.gap_tolerance.store(bytes, Ordering::Relaxed);
    }

    /// 注册或替换尺寸类。
    ///
    /// # 契约说明（What）
    /// - `pool` 为 `None` 时构造一个产出 `size` 字节缓冲的新池；
    /// - 已存在同尺寸的类时原位替换池绑定，不新增条目；
    /// - `size == 0` 返回 [`PoolError::ZeroSizeClass`]。
    pub fn insert(&self, size: usize, pool: Option<Arc<BufferPool>>) -> Result<InsertOutcome> {
        if size == 0 {
            return Err(PoolError::ZeroSizeClass);
        }
        let pool = pool.unwrap_or_else(|| self.build_pool(size));
        let outcome = self.mutate(|table| table.upsert(size, pool));
        tracing::debug!(size, tier = %Tier::of(size), ?outcome, "size class registered");
        Ok(outcome)
    }

    /// 仅当 `size` 尚未注册时插入由注册表构造的池；检查与插入在同一写锁内完成。
    ///
    /// 返回 `Ok(true)` 表示新增了条目，`Ok(false)` 表示已存在、未做任何修改。
    pub fn insert_if_absent(&self, size: usize) -> Result<bool> {
        if size == 0 {
            return Err(PoolError::ZeroSizeClass);
        }
        let _writer = self.writer.lock();
        let current = self.table.load_full();
        if current.lookup_exact(size).is_some() {
            return Ok(false);
        }
        let mut next = ClassTable::clone(&current);
        next.upsert(size, self.build_pool(size));
        self.table.store(Arc::new(next));
        tracing::debug!(size, tier = %Tier::of(size), "size class registered");
        Ok(true)
    }

    /// 批量注册尺寸类并一次性发布，池均由注册表构造。返回新增的条目数。
    pub fn insert_all(&self, sizes: &[usize]) -> Result<usize> {
        if sizes.contains(&0) {
            return Err(PoolError::ZeroSizeClass);
        }
        let inserted = self.mutate(|table| {
            sizes
                .iter()
                .filter(|&&size| table.upsert(size, self.build_pool(size)) == InsertOutcome::Inserted)
                .count()
        });
        tracing::debug!(requested = sizes.len(), inserted, "size classes registered");
        Ok(inserted)
    }

    /// 精确查找，仅扫描 `size` 所属层级。
    pub fn lookup_exact(&self, size: usize) -> Option<Arc<BufferPool>> {
        self.table
            .load()
            .lookup_exact(size)
            .map(|class| Arc::clone(&class.pool))
    }

    /// 是否已存在精确尺寸类。
    pub fn contains(&self, size: usize) -> bool {
        self.table.load().lookup_exact(size).is_some()
    }

    /// 近似匹配：层级内满足 `entry.size >= size` 且 `entry.size - size < gap_tolerance` 的最小尺寸类。
    ///
    /// 调用方负责先行归一化；本方法按传入的字节数原样匹配。
    pub fn nearest_fit(&self, size: usize) -> Option<SizeClass> {
        self.table
            .load()
            .nearest_fit(size, self.gap_tolerance())
            .cloned()
    }

    /// 清空全部尺寸类，用于独立运行之间的重置。
    pub fn clear(&self) {
        let dropped = self.mutate(|table| {
            let dropped = table.classes.len();
            *table = ClassTable::default();
            dropped
        });
        tracing::info!(dropped, "size class registry cleared");
    }

    /// 尺寸类数量。
    pub fn len(&self) -> usize {
        self.table.load().classes.len()
    }

    /// 是否没有任何尺寸类。
    pub fn is_empty(&self) -> bool {
        self.table.load().classes.is_empty()
    }

    /// 升序排列的尺寸列表。
    pub fn sizes(&self) -> Vec<usize> {
        self.table.load().classes.iter().map(SizeClass::size).collect()
    }

    /// 当前快照中的全部尺寸类。
    pub fn classes(&self) -> Vec<SizeClass> {
        self.table.load().classes.clone()
    }

    /// 大单位层级首元素的下标。
    pub fn large_tier_start(&self) -> Option<usize> {
        self.table.load().large_start
    }

    fn build_pool(&self, size: usize) -> Arc<BufferPool> {
        Arc::new(BufferPool::with_max_idle(size, self.max_idle))
    }

    fn mutate<R>(&self, apply: impl FnOnce(&mut ClassTable) -> R) -> R {
        let _writer = self.writer.lock();
        let mut next = ClassTable::clone(&self.table.load());
        let outcome = apply(&mut next);
        self.table.store(Arc::new(next));
        outcome
    }
}

impl core::fmt::Debug for SizeClassRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SizeClassRegistry")
            .field("sizes", &self.sizes())
            .field("large_start", &self.large_tier_start())
            .field("gap_tolerance", &self.gap_tolerance())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::MIB;

    #[test]
    fn starts_with_default_class() {
        let registry = SizeClassRegistry::new(5 * KIB);
        assert_eq!(registry.sizes(), vec![KIB]);
        assert_eq!(registry.large_tier_start(), None);
    }

    #[test]
    fn boundary_tracks_first_large_member() {
        let registry = SizeClassRegistry::new(5 * KIB);
        registry.insert(1, None).expect("插入 1 字节尺寸类");
        assert_eq!(registry.large_tier_start(), None);

        registry.insert(2 * MIB, None).expect("插入 2 MiB");
        assert_eq!(registry.sizes(), vec![1, KIB, 2 * MIB]);
        assert_eq!(registry.large_tier_start(), Some(2));

        let pool = Arc::new(BufferPool::new(MIB));
        registry.insert(MIB, Some(pool.clone())).expect("插入 1 MiB");
        assert_eq!(registry.large_tier_start(), Some(2));
        assert_eq!(registry.sizes()[2], MIB);
        let found = registry.lookup_exact(MIB).expect("1 MiB 应可精确命中");
        assert!(Arc::ptr_eq(&found, &pool));

        registry.insert(4 * KIB, None).expect("插入 4 KiB");
        assert_eq!(registry.large_tier_start(), Some(3));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn replacing_keeps_entry_count() {
        let registry = SizeClassRegistry::new(5 * KIB);
        let replacement = Arc::new(BufferPool::new(KIB));
        let outcome = registry
            .insert(KIB, Some(replacement.clone()))
            .expect("替换默认尺寸类");
        assert_eq!(outcome, InsertOutcome::Replaced);
        assert_eq!(registry.len(), 1);
        let found = registry.lookup_exact(KIB).expect("替换后仍可命中");
        assert!(Arc::ptr_eq(&found, &replacement));
    }

    #[test]
    fn insert_if_absent_keeps_existing_binding() {
        let registry = SizeClassRegistry::new(KIB);
        let original = registry.lookup_exact(KIB).expect("默认尺寸类");
        assert_eq!(registry.insert_if_absent(KIB), Ok(false));
        let still = registry.lookup_exact(KIB).expect("默认尺寸类");
        assert!(Arc::ptr_eq(&original, &still));

        assert_eq!(registry.insert_if_absent(3 * MIB), Ok(true));
        assert!(registry.contains(3 * MIB));
        assert_eq!(registry.large_tier_start(), Some(1));
    }

    #[test]
    fn rejects_zero_size() {
        let registry = SizeClassRegistry::new(KIB);
        assert_eq!(registry.insert(0, None), Err(PoolError::ZeroSizeClass));
        assert_eq!(registry.insert_all(&[KIB, 0]), Err(PoolError::ZeroSizeClass));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_is_restricted_to_tier() {
        let registry = SizeClassRegistry::new(5 * KIB);
        registry.insert_all(&[5 * MIB, 6 * MIB]).expect("批量插入");
        assert!(registry.lookup_exact(6).is_none());
        assert!(registry.lookup_exact(6 * MIB).is_some());
    }

    #[test]
    fn nearest_fit_respects_strict_gap() {
        let registry = SizeClassRegistry::new(KIB);
        registry.insert(3 * KIB, None).expect("插入 3 KiB");

        let hit = registry.nearest_fit(2 * KIB + 1).expect("松弛 1023 字节应命中");
        assert_eq!(hit.size(), 3 * KIB);
        assert!(registry.nearest_fit(2 * KIB).is_none(), "松弛恰等于容差时不命中");

        registry.set_gap_tolerance(0);
        assert!(registry.nearest_fit(3 * KIB).is_none(), "容差为 0 时任何尺寸都不命中");
    }

    #[test]
    fn clear_resets_boundary() {
        let registry = SizeClassRegistry::new(KIB);
        registry.insert(8 * MIB, None).expect("插入 8 MiB");
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.large_tier_start(), None);
        assert!(registry.nearest_fit(KIB).is_none());
    }

    #[test]
    fn snapshot_outlives_concurrent_clear() {
        let registry = SizeClassRegistry::new(KIB);
        let class = registry.nearest_fit(KIB).expect("默认尺寸类应命中");
        registry.clear();
        let buffer = class.pool().acquire();
        assert!(buffer.capacity() >= KIB);
        class.pool().release(buffer);
    }
}
