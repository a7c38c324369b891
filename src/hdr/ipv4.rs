//! IPv4 头部（20 字节，无选项）
//!
//! ECN 使用 TOS 字节的低两位：00=Non-ECT，01=ECT(1)，10=ECT(0)，11=CE。

use std::fmt;
use std::net::Ipv4Addr;

use crate::packet::{Header, PacketError};
use crate::packet::{get_u16, get_u32, need, put_u16, put_u32};

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;

/// ECN 码点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ecn {
    #[default]
    NotEct,
    Ect1,
    Ect0,
    Ce,
}

impl Ecn {
    pub fn is_ect(self) -> bool {
        matches!(self, Ecn::Ect0 | Ecn::Ect1)
    }

    pub fn is_ce(self) -> bool {
        matches!(self, Ecn::Ce)
    }

    pub fn to_bits(self) -> u8 {
        match self {
            Ecn::NotEct => 0b00,
            Ecn::Ect1 => 0b01,
            Ecn::Ect0 => 0b10,
            Ecn::Ce => 0b11,
        }
    }

    pub fn from_bits(bits: u8) -> Ecn {
        match bits & 0b11 {
            0b00 => Ecn::NotEct,
            0b01 => Ecn::Ect1,
            0b10 => Ecn::Ect0,
            _ => Ecn::Ce,
        }
    }
}

/// IPv4 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub dscp: u8,
    pub ecn: Ecn,
    /// 总长（含头部）
    pub total_len: u16,
    pub ident: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload_len: u16) -> Ipv4Header {
        Ipv4Header {
            dscp: 0,
            ecn: Ecn::NotEct,
            total_len: payload_len.saturating_add(20),
            ident: 0,
            ttl: 64,
            protocol,
            src,
            dst,
        }
    }

    /// ECT -> CE；非 ECT 不变。交换机标记路径使用。
    pub fn mark_ce_if_ect(&mut self) -> bool {
        if self.ecn.is_ect() {
            self.ecn = Ecn::Ce;
            true
        } else {
            false
        }
    }
}

/// RFC 1071 internet checksum
fn checksum(buf: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < buf.len() {
        sum += u32::from(get_u16(buf, i));
        i += 2;
    }
    if i < buf.len() {
        sum += u32::from(buf[i]) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

impl fmt::Display for Ipv4Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ipv4 {} -> {} proto={} len={} ecn={:?}",
            self.src, self.dst, self.protocol, self.total_len, self.ecn
        )
    }
}

impl Header for Ipv4Header {
    fn serialized_size(&self) -> usize {
        20
    }

    fn serialize(&self, buf: &mut [u8]) {
        buf[0] = 0x45; // version 4, ihl 5
        buf[1] = (self.dscp << 2) | self.ecn.to_bits();
        put_u16(buf, 2, self.total_len);
        put_u16(buf, 4, self.ident);
        put_u16(buf, 6, 0); // flags/fragment
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        put_u16(buf, 10, 0); // checksum 占位
        put_u32(buf, 12, u32::from(self.src));
        put_u32(buf, 16, u32::from(self.dst));
        let sum = checksum(&buf[..20]);
        put_u16(buf, 10, sum);
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        need(buf, 20)?;
        if buf[0] >> 4 != 4 {
            return Err(PacketError::Malformed {
                what: "ipv4 version",
            });
        }
        let ihl = usize::from(buf[0] & 0x0f) * 4;
        if ihl < 20 {
            return Err(PacketError::Malformed { what: "ipv4 ihl" });
        }
        need(buf, ihl)?;
        Ok((
            Ipv4Header {
                dscp: buf[1] >> 2,
                ecn: Ecn::from_bits(buf[1]),
                total_len: get_u16(buf, 2),
                ident: get_u16(buf, 4),
                ttl: buf[8],
                protocol: buf[9],
                src: Ipv4Addr::from(get_u32(buf, 12)),
                dst: Ipv4Addr::from(get_u32(buf, 16)),
            },
            ihl,
        ))
    }
}
