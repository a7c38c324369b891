//! 以太网头部（14 字节）

use std::fmt;

use crate::packet::{Header, PacketError};
use crate::packet::{get_u16, need, put_u16};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// MAC 控制帧（PFC PAUSE 使用）
pub const ETHERTYPE_MAC_CONTROL: u16 = 0x8808;

/// 48 位 MAC 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; 6]);

    /// 由节点号派生的稳定单播地址（仿真内无需 ARP）。
    pub fn from_node(node: usize) -> Mac {
        let n = node as u32;
        Mac([
            0x02,
            0x00,
            (n >> 24) as u8,
            (n >> 16) as u8,
            (n >> 8) as u8,
            n as u8,
        ])
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// 以太网 II 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: Mac,
    pub src: Mac,
    pub ethertype: u16,
}

impl fmt::Display for EthernetHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "eth {} -> {} type=0x{:04x}",
            self.src, self.dst, self.ethertype
        )
    }
}

impl Header for EthernetHeader {
    fn serialized_size(&self) -> usize {
        14
    }

    fn serialize(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.dst.0);
        buf[6..12].copy_from_slice(&self.src.0);
        put_u16(buf, 12, self.ethertype);
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        need(buf, 14)?;
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&buf[0..6]);
        src.copy_from_slice(&buf[6..12]);
        Ok((
            EthernetHeader {
                dst: Mac(dst),
                src: Mac(src),
                ethertype: get_u16(buf, 12),
            },
            14,
        ))
    }
}
