//! 共享字节 arena
//!
//! `Arc<Vec<u8>>` 上的一个 `[start, end)` 窗口。多个 Buffer 可共享同一 arena；
//! 任何写入在共享时先克隆（copy-on-write），保证已有视图的字节不变。

use std::sync::Arc;

/// 写时复制的字节窗口。
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    data: Arc<Vec<u8>>,
    start: usize,
    end: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Buffer {
        Buffer {
            data: Arc::new(bytes.to_vec()),
            start: 0,
            end: bytes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// 是否与其它 Buffer 共享 arena
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// 头部扩展 `n` 个零字节；arena 共享或无空间时重新分配。
    pub fn add_at_start(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if self.start >= n {
            if let Some(v) = Arc::get_mut(&mut self.data) {
                self.start -= n;
                v[self.start..self.start + n].fill(0);
                return;
            }
        }
        let len = self.len();
        let mut v = vec![0u8; n + len];
        v[n..].copy_from_slice(&self.data[self.start..self.end]);
        self.data = Arc::new(v);
        self.start = 0;
        self.end = n + len;
    }

    /// 尾部扩展 `n` 个零字节。
    pub fn add_at_end(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if self.data.len() >= self.end + n {
            if let Some(v) = Arc::get_mut(&mut self.data) {
                v[self.end..self.end + n].fill(0);
                self.end += n;
                return;
            }
        }
        let len = self.len();
        let mut v = vec![0u8; len + n];
        v[..len].copy_from_slice(&self.data[self.start..self.end]);
        self.data = Arc::new(v);
        self.start = 0;
        self.end = len + n;
    }

    /// 头部收缩；调用方保证 `n <= len()`。
    pub fn remove_at_start(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.start += n;
    }

    /// 尾部收缩；调用方保证 `n <= len()`。
    pub fn remove_at_end(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        self.end -= n;
    }

    /// 零拷贝子视图：共享 arena。
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        debug_assert!(offset + len <= self.len());
        Buffer {
            data: Arc::clone(&self.data),
            start: self.start + offset,
            end: self.start + offset + len,
        }
    }

    /// 追加另一个窗口的字节（始终复制）。
    pub fn extend_from(&mut self, other: &Buffer) {
        let old = self.len();
        self.add_at_end(other.len());
        let dst = self.make_mut();
        dst[old..].copy_from_slice(other.as_slice());
    }

    /// 取得独占可写切片；共享时克隆窗口。
    pub fn make_mut(&mut self) -> &mut [u8] {
        if Arc::get_mut(&mut self.data).is_none() {
            let v = self.data[self.start..self.end].to_vec();
            self.end = v.len();
            self.start = 0;
            self.data = Arc::new(v);
        }
        let (start, end) = (self.start, self.end);
        let v = Arc::get_mut(&mut self.data).expect("unique after clone");
        &mut v[start..end]
    }
}
