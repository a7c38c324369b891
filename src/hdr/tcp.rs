//! TCP 头部（20 字节，无选项）
//!
//! 9 位标志域：FIN=1 SYN=2 RST=4 PSH=8 ACK=16 URG=32 ECE=64 CWR=128 NS=256。

use std::fmt;

use crate::packet::{Header, PacketError};
use crate::packet::{get_u16, get_u32, need, put_u16, put_u32};

/// TCP 标志位集合（9 位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u16);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(1);
    pub const SYN: TcpFlags = TcpFlags(2);
    pub const RST: TcpFlags = TcpFlags(4);
    pub const PSH: TcpFlags = TcpFlags(8);
    pub const ACK: TcpFlags = TcpFlags(16);
    pub const URG: TcpFlags = TcpFlags(32);
    pub const ECE: TcpFlags = TcpFlags(64);
    pub const CWR: TcpFlags = TcpFlags(128);
    pub const NS: TcpFlags = TcpFlags(256);

    pub fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: TcpFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: TcpFlags) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;
    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u16, &str); 9] = [
            (1, "FIN"),
            (2, "SYN"),
            (4, "RST"),
            (8, "PSH"),
            (16, "ACK"),
            (32, "URG"),
            (64, "ECE"),
            (128, "CWR"),
            (256, "NS"),
        ];
        let mut first = true;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// TCP 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub urgent: u16,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> TcpHeader {
        TcpHeader {
            src_port,
            dst_port,
            seq: 0,
            ack: 0,
            flags: TcpFlags::default(),
            window: u16::MAX,
            urgent: 0,
        }
    }
}

impl fmt::Display for TcpHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tcp {}->{} seq={} ack={} [{}] win={}",
            self.src_port, self.dst_port, self.seq, self.ack, self.flags, self.window
        )
    }
}

impl Header for TcpHeader {
    fn serialized_size(&self) -> usize {
        20
    }

    fn serialize(&self, buf: &mut [u8]) {
        put_u16(buf, 0, self.src_port);
        put_u16(buf, 2, self.dst_port);
        put_u32(buf, 4, self.seq);
        put_u32(buf, 8, self.ack);
        // data offset 5 词 + NS 位（保留域最低位）
        let ns = if self.flags.contains(TcpFlags::NS) { 1 } else { 0 };
        buf[12] = (5 << 4) | ns;
        buf[13] = (self.flags.0 & 0xff) as u8;
        put_u16(buf, 14, self.window);
        put_u16(buf, 16, 0); // checksum：仿真内不计算
        put_u16(buf, 18, self.urgent);
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        need(buf, 20)?;
        let off = usize::from(buf[12] >> 4) * 4;
        if off < 20 {
            return Err(PacketError::Malformed {
                what: "tcp data offset",
            });
        }
        need(buf, off)?;
        let mut flags = u16::from(buf[13]);
        if buf[12] & 0x01 != 0 {
            flags |= TcpFlags::NS.0;
        }
        Ok((
            TcpHeader {
                src_port: get_u16(buf, 0),
                dst_port: get_u16(buf, 2),
                seq: get_u32(buf, 4),
                ack: get_u32(buf, 8),
                flags: TcpFlags(flags),
                window: get_u16(buf, 14),
                urgent: get_u16(buf, 18),
            },
            off,
        ))
    }
}
