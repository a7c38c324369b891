//! 接收重组缓冲
//!
//! 序号 -> 段的有序映射；相邻/重叠段合并；连续前缀搬入已装配队列。
//! `next_rx_seq` 是仍在等待的第一个字节，`max_rx_seq` 是通告窗口上限。

use std::collections::{BTreeMap, VecDeque};

/// TCP 接收缓冲。
#[derive(Debug)]
pub struct RxBuffer {
    /// 乱序段：seq -> bytes
    segs: BTreeMap<u32, Vec<u8>>,
    /// 已按序装配、等待应用读取的字节
    assembled: VecDeque<u8>,
    next_rx_seq: u32,
    max_size: u32,
    fin_seq: Option<u32>,
}

impl RxBuffer {
    pub fn new(next_rx_seq: u32, max_size: u32) -> RxBuffer {
        RxBuffer {
            segs: BTreeMap::new(),
            assembled: VecDeque::new(),
            next_rx_seq,
            max_size,
            fin_seq: None,
        }
    }

    pub fn next_rx_seq(&self) -> u32 {
        self.next_rx_seq
    }

    pub fn set_next_rx_seq(&mut self, seq: u32) {
        debug_assert!(self.segs.is_empty() && self.assembled.is_empty());
        self.next_rx_seq = seq;
    }

    /// 通告窗口上限：next + 剩余空间。
    pub fn max_rx_seq(&self) -> u32 {
        self.next_rx_seq.saturating_add(self.window())
    }

    /// 可通告的窗口
    pub fn window(&self) -> u32 {
        let buffered = self.assembled.len() as u32
            + self.segs.values().map(|v| v.len() as u32).sum::<u32>();
        self.max_size.saturating_sub(buffered)
    }

    /// 从 `next_rx_seq` 起连续可读的字节数
    pub fn available(&self) -> u32 {
        self.assembled.len() as u32
    }

    /// 对端 FIN 的序号（FIN 占一个序号位）。
    pub fn set_fin_seq(&mut self, seq: u32) {
        self.fin_seq = Some(seq);
    }

    pub fn fin_seq(&self) -> Option<u32> {
        self.fin_seq
    }

    /// 数据已收齐且到达 FIN 边界
    pub fn fin_reached(&self) -> bool {
        self.fin_seq == Some(self.next_rx_seq)
    }

    /// 插入一段；越界部分裁剪，重叠合并。返回是否有新字节被接受。
    pub fn add(&mut self, seq: u32, data: &[u8]) -> bool {
        if data.is_empty() {
            return false;
        }
        let max_rx = self.max_rx_seq();
        let seg_end = seq.saturating_add(data.len() as u32);
        let lo = seq.max(self.next_rx_seq);
        let hi = seg_end.min(max_rx);
        if lo >= hi {
            return false;
        }
        let mut start = lo;
        let mut bytes: Vec<u8> = data[(lo - seq) as usize..(hi - seq) as usize].to_vec();

        // 与前驱合并
        if let Some((&pseq, pdata)) = self.segs.range(..=start).next_back() {
            let pend = pseq + pdata.len() as u32;
            if pend >= start {
                if pend >= start + bytes.len() as u32 {
                    return false; // 完全被覆盖
                }
                let keep = (pend - start) as usize;
                let mut merged = self.segs.remove(&pseq).expect("pred exists");
                merged.extend_from_slice(&bytes[keep..]);
                start = pseq;
                bytes = merged;
            }
        }
        // 与后继合并
        let end = start + bytes.len() as u32;
        let followers: Vec<u32> = self
            .segs
            .range(start..end.saturating_add(1))
            .map(|(&s, _)| s)
            .collect();
        let mut end = end;
        for fseq in followers {
            let fdata = self.segs.remove(&fseq).expect("follower exists");
            let fend = fseq + fdata.len() as u32;
            if fend > end {
                let keep = (end - fseq) as usize;
                bytes.extend_from_slice(&fdata[keep..]);
                end = fend;
            }
        }
        self.segs.insert(start, bytes);
        self.pump();
        true
    }

    /// 把连续前缀搬入已装配队列并推进 `next_rx_seq`。
    fn pump(&mut self) {
        while let Some((&seq, _)) = self.segs.first_key_value() {
            if seq != self.next_rx_seq {
                break;
            }
            let bytes = self.segs.remove(&seq).expect("head seg");
            self.next_rx_seq = self.next_rx_seq.saturating_add(bytes.len() as u32);
            self.assembled.extend(bytes);
        }
    }

    /// 读出至多 `max` 个已装配字节。
    pub fn extract(&mut self, max: u32) -> Vec<u8> {
        let n = (max as usize).min(self.assembled.len());
        self.assembled.drain(..n).collect()
    }
}
