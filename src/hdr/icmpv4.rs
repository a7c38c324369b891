//! ICMPv4 头部（RFC 792 布局）
//!
//! 支持 echo/echo-reply、destination-unreachable、time-exceeded 三类。

use std::fmt;

use crate::packet::{Header, PacketError};
use crate::packet::{get_u16, get_u32, need, put_u16, put_u32};

/// 报文种类与其类型相关字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icmpv4Kind {
    Echo { ident: u16, seq: u16 },
    EchoReply { ident: u16, seq: u16 },
    /// code：0=net、1=host、3=port unreachable ...
    DestUnreachable { code: u8 },
    /// code：0=TTL exceeded、1=fragment reassembly
    TimeExceeded { code: u8 },
}

/// ICMPv4 头部（8 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv4Header {
    pub kind: Icmpv4Kind,
}

impl Icmpv4Header {
    fn type_code(&self) -> (u8, u8) {
        match self.kind {
            Icmpv4Kind::EchoReply { .. } => (0, 0),
            Icmpv4Kind::DestUnreachable { code } => (3, code),
            Icmpv4Kind::Echo { .. } => (8, 0),
            Icmpv4Kind::TimeExceeded { code } => (11, code),
        }
    }
}

impl fmt::Display for Icmpv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ty, code) = self.type_code();
        write!(f, "icmp type={ty} code={code}")
    }
}

impl Header for Icmpv4Header {
    fn serialized_size(&self) -> usize {
        8
    }

    fn serialize(&self, buf: &mut [u8]) {
        let (ty, code) = self.type_code();
        buf[0] = ty;
        buf[1] = code;
        put_u16(buf, 2, 0); // checksum：仿真内不计算
        match self.kind {
            Icmpv4Kind::Echo { ident, seq } | Icmpv4Kind::EchoReply { ident, seq } => {
                put_u16(buf, 4, ident);
                put_u16(buf, 6, seq);
            }
            Icmpv4Kind::DestUnreachable { .. } | Icmpv4Kind::TimeExceeded { .. } => {
                put_u32(buf, 4, 0); // unused
            }
        }
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        need(buf, 8)?;
        let kind = match buf[0] {
            0 => Icmpv4Kind::EchoReply {
                ident: get_u16(buf, 4),
                seq: get_u16(buf, 6),
            },
            8 => Icmpv4Kind::Echo {
                ident: get_u16(buf, 4),
                seq: get_u16(buf, 6),
            },
            3 => {
                let _ = get_u32(buf, 4);
                Icmpv4Kind::DestUnreachable { code: buf[1] }
            }
            11 => Icmpv4Kind::TimeExceeded { code: buf[1] },
            _ => {
                return Err(PacketError::Malformed { what: "icmp type" });
            }
        };
        Ok((Icmpv4Header { kind }, 8))
    }
}
