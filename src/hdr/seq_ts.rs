//! SeqTs 头部
//!
//! 4 字节序号 + 8 字节时间戳，后接定长 INT 遥测占位（DC 遥测变体使用）。

use std::fmt;

use crate::packet::{Header, PacketError};
use crate::packet::{get_u32, get_u64, need, put_u32, put_u64};

/// INT 遥测占位长度（字节）
const INT_STUB_LEN: usize = 8;

/// 序号 + 时间戳头部
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeqTsHeader {
    pub seq: u32,
    /// 发送时刻（全局精度计数）
    pub ts: u64,
    /// 是否携带 INT 遥测占位
    pub with_int: bool,
}

impl SeqTsHeader {
    pub fn new(seq: u32, ts: u64) -> SeqTsHeader {
        SeqTsHeader {
            seq,
            ts,
            with_int: false,
        }
    }
}

impl fmt::Display for SeqTsHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seqts seq={} ts={} int={}", self.seq, self.ts, self.with_int)
    }
}

impl Header for SeqTsHeader {
    fn serialized_size(&self) -> usize {
        if self.with_int { 12 + INT_STUB_LEN } else { 12 }
    }

    fn serialize(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.seq);
        put_u64(buf, 4, self.ts);
        if self.with_int {
            buf[12..12 + INT_STUB_LEN].fill(0);
        }
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        need(buf, 12)?;
        // INT 占位只在缓冲恰好为带占位长度时存在（SeqTs 总是最内层头部）。
        let with_int = buf.len() == 12 + INT_STUB_LEN;
        let used = if with_int { 12 + INT_STUB_LEN } else { 12 };
        Ok((
            SeqTsHeader {
                seq: get_u32(buf, 0),
                ts: get_u64(buf, 4),
                with_int,
            },
            used,
        ))
    }
}
