use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::{
    buffer::ByteBuffer,
    config::{TieredPoolConfig, class_sizes},
    error::Result,
    normalize::{Tier, normalize},
    object_pool::{BufferPool, DEFAULT_MAX_IDLE},
    promoter::AdaptivePromoter,
    registry::{InsertOutcome, SizeClass, SizeClassRegistry},
    stats::{SizeClassStats, TieredPoolStats},
};

/// `TieredPool` 是分级缓冲池的唯一入口。
///
/// # 模块角色（Why）
/// - 串联归一化、近似匹配、自适应提升与缓冲租借，对调用方只暴露 `serve` 一个热路径；
/// - 实例是显式的值，可按进程或按测试各自构造，互不干扰；跨线程共享时包一层 `Arc` 即可。
///
/// # 核心流程（How）
/// 1. `canonical = normalize(size)`；
/// 2. 在注册表快照中做近似匹配；
/// 3. 命中：从尺寸类的池中租借缓冲，执行回调，随后重置并归还；
/// 4. 未命中：向提升器记录一次未命中，再以原始 `size` 构造一次性缓冲执行回调。
///
/// # 契约说明（What）
/// - 回调拿到的缓冲长度为 0、容量不小于 `size`；
/// - 命中路径上，无论回调成功、失败还是 panic，租借的缓冲都恰好归还一次，且先于结果返回；
/// - 回调的错误原样透传，本类型不包装也不吞掉。
#[derive(Debug)]
pub struct TieredPool {
    registry: SizeClassRegistry,
    promoter: AdaptivePromoter,
    counters: ServeCounters,
}

#[derive(Debug, Default)]
struct ServeCounters {
    pooled: AtomicU64,
    unpooled: AtomicU64,
}

impl TieredPool {
    /// 以默认阈值创建，仅含默认 1 KiB 尺寸类。
    pub fn new(gap_tolerance: usize) -> Self {
        Self {
            registry: SizeClassRegistry::with_max_idle(gap_tolerance, DEFAULT_MAX_IDLE),
            promoter: AdaptivePromoter::new(),
            counters: ServeCounters::default(),
        }
    }

    /// 按配置构建：先整体校验，再一次性注册预设尺寸类。
    pub fn from_config(config: &TieredPoolConfig) -> Result<Self> {
        config.validate()?;
        let pool = Self {
            registry: SizeClassRegistry::with_max_idle(
                config.gap_tolerance,
                config.max_idle_per_class,
            ),
            promoter: AdaptivePromoter::with_threshold(config.attempt_threshold)?,
            counters: ServeCounters::default(),
        };

        let mut sizes = class_sizes(Tier::SmallUnit, &config.small_unit_classes)?;
        sizes.extend(class_sizes(Tier::LargeUnit, &config.large_unit_classes)?);
        pool.registry.insert_all(&sizes)?;
        Ok(pool)
    }

    /// 注册以 KiB 计的尺寸类。任一单位越界时整批拒绝，注册表保持不变。
    pub fn register_small_unit_classes(&self, units: &[usize]) -> Result<usize> {
        self.register_units(Tier::SmallUnit, units)
    }

    /// 注册以 MiB 计的尺寸类。任一单位越界时整批拒绝，注册表保持不变。
    pub fn register_large_unit_classes(&self, units: &[usize]) -> Result<usize> {
        self.register_units(Tier::LargeUnit, units)
    }

    fn register_units(&self, tier: Tier, units: &[usize]) -> Result<usize> {
        let sizes = class_sizes(tier, units)?;
        self.registry.insert_all(&sizes)
    }

    pub fn set_attempt_threshold(&self, threshold: usize) -> Result<()> {
        self.promoter.set_attempt_threshold(threshold)
    }

    pub fn set_gap_tolerance(&self, bytes: usize) {
        self.registry.set_gap_tolerance(bytes);
    }

    /// 精确查找 `size` 对应的池。
    pub fn lookup_exact(&self, size: usize) -> Option<Arc<BufferPool>> {
        self.registry.lookup_exact(size)
    }

    /// 注册或替换尺寸类。
    ///
    /// - 未提供池时先归一化 `size`，再由注册表构造池；
    /// - 显式提供池时按 `size` 原值登记，调用方对该绑定负责。
    pub fn register_or_replace(
        &self,
        size: usize,
        pool: Option<Arc<BufferPool>>,
    ) -> Result<InsertOutcome> {
        let size = if pool.is_none() { normalize(size) } else { size };
        self.registry.insert(size, pool)
    }

    /// 归一化后做近似匹配，返回命中的池。不记录未命中。
    pub fn nearest_fit(&self, size: usize) -> Option<Arc<BufferPool>> {
        self.registry
            .nearest_fit(normalize(size))
            .map(|class| Arc::clone(class.pool()))
    }

    /// 清空全部尺寸类与失败账本。
    pub fn clear(&self) {
        self.registry.clear();
        self.promoter.reset();
    }

    /// 为回调提供容量不小于 `size` 的空缓冲。
    pub fn serve<T, E, F>(&self, size: usize, op: F) -> core::result::Result<T, E>
    where
        F: FnOnce(&mut ByteBuffer) -> core::result::Result<T, E>,
    {
        let canonical = normalize(size);
        match self.registry.nearest_fit(canonical) {
            Some(class) => {
                self.counters.pooled.fetch_add(1, Ordering::Relaxed);
                serve_pooled(&class, size, op)
            }
            None => {
                self.counters.unpooled.fetch_add(1, Ordering::Relaxed);
                self.promoter.record_miss(canonical, &self.registry);
                let mut buffer = ByteBuffer::with_capacity(size);
                op(&mut buffer)
            }
        }
    }

    /// 升序排列的已注册尺寸。
    pub fn sizes(&self) -> Vec<usize> {
        self.registry.sizes()
    }

    pub fn registry(&self) -> &SizeClassRegistry {
        &self.registry
    }

    pub fn promoter(&self) -> &AdaptivePromoter {
        &self.promoter
    }

    /// 读取统计快照。
    pub fn stats(&self) -> TieredPoolStats {
        let classes = self
            .registry
            .classes()
            .into_iter()
            .map(|class| SizeClassStats {
                size: class.size(),
                tier: class.tier(),
                pool: class.pool().stats(),
            })
            .collect();
        TieredPoolStats {
            pooled_serves: self.counters.pooled.load(Ordering::Relaxed),
            unpooled_serves: self.counters.unpooled.load(Ordering::Relaxed),
            promotions: self.promoter.promotions(),
            pending_misses: self.promoter.pending(),
            classes,
        }
    }
}

fn serve_pooled<T, E, F>(class: &SizeClass, size: usize, op: F) -> core::result::Result<T, E>
where
    F: FnOnce(&mut ByteBuffer) -> core::result::Result<T, E>,
{
    let mut lease = class.pool().lease();
    if lease.capacity() < size {
        tracing::warn!(
            class_size = class.size(),
            pool_capacity = class.pool().capacity(),
            requested = size,
            "pooled buffer smaller than request, growing"
        );
        lease.ensure_capacity(size);
    }
    // 先归还再返回结果；panic 展开时由租约的 Drop 完成归还。
    let outcome = op(&mut *lease);
    lease.release();
    outcome
}
