use std::io;

use bytes::{Bytes, BytesMut};

/// `ByteBuffer` 是池中流转的可增长字节容器。
///
/// # 设计动机（Why）
/// - 以 `bytes::BytesMut` 为后端，`reset` 只清空逻辑长度、保留已分配容量，
///   使同一块内存可以在多次租借之间复用；
/// - 池与注册表对该类型静态参数化，取回对象时无需运行期形状检查。
///
/// # 契约说明（What）
/// - `capacity()` 为无需再分配即可容纳的字节数，`len()` 为已写入的逻辑长度；
/// - 写入超过容量时自动扩容，扩容后的容量随缓冲一起归还池；
/// - 实现 [`io::Write`]，可直接作为序列化器的输出目标。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    inner: BytesMut,
}

impl ByteBuffer {
    /// 创建至少具备 `capacity` 字节容量的空缓冲。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// 已写入的字节数。
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// 是否尚未写入任何数据。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 当前容量。
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// 追加字节并返回写入的数量。
    pub fn put_slice(&mut self, data: &[u8]) -> usize {
        self.inner.extend_from_slice(data);
        data.len()
    }

    /// 追加 UTF-8 字符串。
    pub fn append_str(&mut self, text: &str) -> usize {
        self.put_slice(text.as_bytes())
    }

    /// 将逻辑长度清零，保留容量。
    #[inline]
    pub fn reset(&mut self) {
        self.inner.clear();
    }

    /// 确保容量不小于 `capacity`。
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if self.inner.capacity() < capacity {
            self.inner.reserve(capacity - self.inner.len());
        }
    }

    /// 已写入内容的只读视图。
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// 复制当前内容并冻结为不可变的 `Bytes`，缓冲本身保持不变，仍可归还池。
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner)
    }

    /// 取出底层 `BytesMut`，缓冲不再参与池化。
    pub fn into_inner(self) -> BytesMut {
        self.inner
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl io::Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.put_slice(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
