//! PFC（802.1Qbb 按优先级 PAUSE）控制帧
//!
//! 布局：2 字节 opcode(0x0101) + 2 字节 class-enable 向量 + 8 个 16 位 quanta。
//! quanta 的单位是 512 bit-time；quanta=0 表示恢复发送。

use std::fmt;

use crate::packet::{Header, PacketError};
use crate::packet::{get_u16, need, put_u16};

pub const PFC_OPCODE: u16 = 0x0101;

/// PFC PAUSE 帧载荷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PfcHeader {
    /// bit i 置位表示优先级 i 的 quanta 有效
    pub class_enable: u16,
    pub quanta: [u16; 8],
}

impl PfcHeader {
    /// 暂停单个优先级
    pub fn pause(prio: u8, quanta: u16) -> PfcHeader {
        let mut h = PfcHeader::default();
        h.class_enable = 1 << prio;
        h.quanta[usize::from(prio) & 7] = quanta;
        h
    }

    /// 恢复单个优先级（quanta = 0）
    pub fn resume(prio: u8) -> PfcHeader {
        let mut h = PfcHeader::default();
        h.class_enable = 1 << prio;
        h
    }

    pub fn enabled(&self, prio: u8) -> bool {
        self.class_enable & (1 << prio) != 0
    }
}

impl fmt::Display for PfcHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pfc cev=0x{:02x} quanta={:?}", self.class_enable, self.quanta)
    }
}

impl Header for PfcHeader {
    fn serialized_size(&self) -> usize {
        20
    }

    fn serialize(&self, buf: &mut [u8]) {
        put_u16(buf, 0, PFC_OPCODE);
        put_u16(buf, 2, self.class_enable);
        for (i, q) in self.quanta.iter().enumerate() {
            put_u16(buf, 4 + i * 2, *q);
        }
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError> {
        need(buf, 20)?;
        if get_u16(buf, 0) != PFC_OPCODE {
            return Err(PacketError::Malformed { what: "pfc opcode" });
        }
        let mut quanta = [0u16; 8];
        for (i, q) in quanta.iter_mut().enumerate() {
            *q = get_u16(buf, 4 + i * 2);
        }
        Ok((
            PfcHeader {
                class_enable: get_u16(buf, 2),
                quanta,
            },
            20,
        ))
    }
}
