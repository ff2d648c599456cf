use std::{
    ops::{Deref, DerefMut},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;

use crate::buffer::ByteBuffer;

/// 单个尺寸类默认缓存的空闲缓冲上限。
pub const DEFAULT_MAX_IDLE: usize = 64;

/// `BufferPool` 缓存一种固定容量的 [`ByteBuffer`]。
///
/// # 模块角色（Why）
/// - 每个尺寸类绑定一个 `BufferPool`，租借时优先复用空闲缓冲，避免热路径上的重复堆分配；
/// - 空闲列表为空时按 `capacity` 惰性构造新缓冲，构造过程无状态，可任意重复执行。
///
/// # 核心机制（How）
/// - 内部使用 `parking_lot::Mutex<Vec<ByteBuffer>>` 作为自由链表，临界区只包含 `push`/`pop`；
/// - `PoolMetrics` 以原子计数跟踪命中、构造、归还、丢弃与活跃租约，供 [`BufferPool::stats`] 生成快照。
///
/// # 契约说明（What）
/// - **线程安全**：可在多线程间并发 `acquire`/`release`，租出的缓冲在归还前由调用方独占；
/// - **有损缓存**：空闲数量达到 `max_idle` 后，归还的缓冲直接丢弃；
/// - **后置条件**：`acquire` 返回的缓冲长度为 0，容量不小于构造时的 `capacity`，
///   归还时若容量缩水（调用方取走了底层内存）则不再入池。
pub struct BufferPool {
    capacity: usize,
    max_idle: usize,
    idle: Mutex<Vec<ByteBuffer>>,
    metrics: PoolMetrics,
}

impl BufferPool {
    /// 创建产出 `capacity` 字节缓冲的池，空闲上限为 [`DEFAULT_MAX_IDLE`]。
    pub fn new(capacity: usize) -> Self {
        Self::with_max_idle(capacity, DEFAULT_MAX_IDLE)
    }

    /// 创建指定空闲上限的池。`max_idle` 为 0 时退化为每次新建、从不缓存。
    pub fn with_max_idle(capacity: usize, max_idle: usize) -> Self {
        Self {
            capacity,
            max_idle,
            idle: Mutex::new(Vec::new()),
            metrics: PoolMetrics::default(),
        }
    }

    /// 池中缓冲的标称容量。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 空闲缓冲上限。
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// 当前空闲缓冲数量。
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// 取出一个空缓冲：优先复用空闲缓冲，否则惰性构造。
    pub fn acquire(&self) -> ByteBuffer {
        let reused = self.idle.lock().pop();
        let buffer = match reused {
            Some(mut buffer) => {
                self.metrics.idle_hits.fetch_add(1, Ordering::Relaxed);
                buffer.reset();
                buffer
            }
            None => {
                self.metrics.constructed.fetch_add(1, Ordering::Relaxed);
                ByteBuffer::with_capacity(self.capacity)
            }
        };
        self.metrics.active_leases.fetch_add(1, Ordering::Relaxed);
        buffer
    }

    /// 归还缓冲。缓冲先被重置为零长度，再视空闲上限决定入池或丢弃。
    pub fn release(&self, mut buffer: ByteBuffer) {
        saturating_decrement(&self.metrics.active_leases);
        buffer.reset();
        if buffer.capacity() < self.capacity {
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buffer);
            drop(idle);
            self.metrics.returned.fetch_add(1, Ordering::Relaxed);
        } else {
            drop(idle);
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 以 RAII 方式租借缓冲：[`PooledBuffer`] 在释放或 `Drop` 时自动归还本池。
    pub fn lease(self: &Arc<Self>) -> PooledBuffer {
        PooledBuffer {
            buffer: Some(self.acquire()),
            pool: Arc::clone(self),
        }
    }

    /// 清空空闲列表，返回释放的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        let drained: Vec<ByteBuffer> = core::mem::take(&mut *self.idle.lock());
        drained.iter().map(ByteBuffer::capacity).sum()
    }

    /// 读取统计快照。
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            capacity: self.capacity,
            idle: self.idle(),
            idle_hits: self.metrics.idle_hits.load(Ordering::Relaxed),
            constructed: self.metrics.constructed.load(Ordering::Relaxed),
            returned: self.metrics.returned.load(Ordering::Relaxed),
            discarded: self.metrics.discarded.load(Ordering::Relaxed),
            active_leases: self.metrics.active_leases.load(Ordering::Relaxed),
        }
    }
}

impl core::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("max_idle", &self.max_idle)
            .field("idle", &self.idle())
            .finish()
    }
}

#[derive(Default)]
struct PoolMetrics {
    idle_hits: AtomicU64,
    constructed: AtomicU64,
    returned: AtomicU64,
    discarded: AtomicU64,
    active_leases: AtomicUsize,
}

fn saturating_decrement(target: &AtomicUsize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(1))
    });
}

/// 单个 [`BufferPool`] 的统计快照。
///
/// - `idle_hits`：复用空闲缓冲的次数；
/// - `constructed`：空闲列表为空时惰性构造的次数；
/// - `returned` / `discarded`：归还时入池与丢弃的次数；
/// - `active_leases`：尚未归还的租约数量，所有租约结束后应回到 0。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub idle_hits: u64,
    pub constructed: u64,
    pub returned: u64,
    pub discarded: u64,
    pub active_leases: usize,
}

impl BufferPoolStats {
    /// 归还总次数（入池 + 丢弃）。
    pub fn releases(&self) -> u64 {
        self.returned + self.discarded
    }
}

/// `PooledBuffer` 是一次租约的守卫。
///
/// # 设计动机（Why）
/// - 把“重置并归还”绑定到值的生命周期：无论显式 [`release`](PooledBuffer::release)、
///   提前返回还是 panic 展开，缓冲都恰好归还一次。
///
/// # 契约说明（What）
/// - 通过 `Deref`/`DerefMut` 暴露 [`ByteBuffer`]；
/// - [`detach`](PooledBuffer::detach) 取走缓冲后租约结束，缓冲不再回到池中。
pub struct PooledBuffer {
    buffer: Option<ByteBuffer>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// 显式归还缓冲，等价于 `drop`。
    pub fn release(self) {
        drop(self);
    }

    /// 所属池。
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// 取走缓冲并结束租约，缓冲不再归还。
    pub fn detach(mut self) -> ByteBuffer {
        saturating_decrement(&self.pool.metrics.active_leases);
        self.buffer.take().unwrap_or_default()
    }
}

impl Deref for PooledBuffer {
    type Target = ByteBuffer;

    fn deref(&self) -> &ByteBuffer {
        match self.buffer.as_ref() {
            Some(buffer) => buffer,
            None => unreachable!("PooledBuffer 仅在 detach/drop 时交出缓冲"),
        }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut ByteBuffer {
        match self.buffer.as_mut() {
            Some(buffer) => buffer,
            None => unreachable!("PooledBuffer 仅在 detach/drop 时交出缓冲"),
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}
