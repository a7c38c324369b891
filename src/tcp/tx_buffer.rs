//! 发送缓冲
//!
//! 以字节为单位的环形缓冲：head 序号是第一个未确认字节；
//! 追加受最大容量约束，确认推进时从头部丢弃。

use std::collections::VecDeque;

/// TCP 发送缓冲。
#[derive(Debug)]
pub struct TxBuffer {
    head_seq: u32,
    data: VecDeque<u8>,
    max_size: u32,
}

impl TxBuffer {
    pub fn new(head_seq: u32, max_size: u32) -> TxBuffer {
        TxBuffer {
            head_seq,
            data: VecDeque::new(),
            max_size,
        }
    }

    /// 第一个未确认字节的序号
    pub fn head_seq(&self) -> u32 {
        self.head_seq
    }

    /// 缓冲中的字节数
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// 尾后序号（head + size）
    pub fn tail_seq(&self) -> u32 {
        self.head_seq.saturating_add(self.size())
    }

    /// 剩余可追加容量
    pub fn available(&self) -> u32 {
        self.max_size.saturating_sub(self.size())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 重置 head（连接建立时对齐初始序号）。
    pub fn set_head_seq(&mut self, seq: u32) {
        debug_assert!(self.data.is_empty());
        self.head_seq = seq;
    }

    /// 追加字节；容量不足时截断，返回实际接受的字节数。
    pub fn append(&mut self, bytes: &[u8]) -> u32 {
        let n = (bytes.len() as u32).min(self.available());
        self.data.extend(bytes[..n as usize].iter().copied());
        n
    }

    /// 确认推进：丢弃 `[head, ack)`。`ack` 不超过尾后序号。
    pub fn discard_up_to(&mut self, ack: u32) {
        if ack <= self.head_seq {
            return;
        }
        let n = (ack - self.head_seq).min(self.size());
        self.data.drain(..n as usize);
        self.head_seq = self.head_seq.saturating_add(n);
    }

    /// 拷贝从 `seq` 起的至多 `len` 字节连续切片。
    /// `seq` 必须落在 `[head, head+size)` 内，否则返回空。
    pub fn copy_slice(&self, seq: u32, len: u32) -> Vec<u8> {
        if seq < self.head_seq || seq >= self.tail_seq() {
            return Vec::new();
        }
        let off = (seq - self.head_seq) as usize;
        let n = (len as usize).min(self.data.len() - off);
        self.data.iter().skip(off).take(n).copied().collect()
    }
}
