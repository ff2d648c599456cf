//! `spark-tiered-pool` 提供按尺寸类分级的字节缓冲池。
//!
//! # 模块定位（Why）
//! - 序列化暂存区等热路径反复需要大小不一、但经常重复的临时缓冲；
//!   每次都向堆申请会带来可观的分配抖动。
//! - 本 crate 把请求尺寸归一化到规范边界，在有序尺寸类中做带松弛上限的近似匹配，
//!   并把反复未命中的尺寸自适应提升为专属池，使缓冲在请求之间复用。
//!
//! # 设计概要（How）
//! - `normalize`：KiB / MiB 两级单位的尺寸归一化；
//! - `registry`：分层、升序、写时复制的尺寸类注册表，读路径无锁；
//! - `promoter`：基于失败账本的自适应提升；
//! - `object_pool` / `buffer`：单一容量的缓冲池与 `BytesMut` 缓冲；
//! - `tiered`：对外入口 [`TieredPool`]，`serve` 保证租借的缓冲恰好归还一次。
//!
//! # 使用示例
//!
//! ```
//! use spark_tiered_pool::{TieredPool, normalize::KIB};
//!
//! let pool = TieredPool::new(5 * KIB);
//! pool.register_small_unit_classes(&[4, 8]).expect("单位合法");
//!
//! let len = pool
//!     .serve(3000, |buffer| {
//!         assert!(buffer.capacity() >= 3000);
//!         Ok::<_, std::io::Error>(buffer.append_str("scratch"))
//!     })
//!     .expect("回调成功");
//! assert_eq!(len, 7);
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod normalize;
pub mod object_pool;
pub mod promoter;
pub mod registry;
pub mod stats;
pub mod tiered;

pub use buffer::ByteBuffer;
pub use config::TieredPoolConfig;
pub use error::{PoolError, Result};
pub use normalize::{Tier, normalize};
pub use object_pool::{BufferPool, BufferPoolStats, PooledBuffer};
pub use promoter::{AdaptivePromoter, MissOutcome};
pub use registry::{InsertOutcome, SizeClass, SizeClassRegistry};
pub use stats::{SizeClassStats, TieredPoolStats};
pub use tiered::TieredPool;
