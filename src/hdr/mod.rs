//! 线上头部格式
//!
//! 与跨实现测试逐位对齐的头部：以太网、IPv4（含 ECN 位）、TCP（9 位标志域）、
//! PFC PAUSE 帧、ICMPv4 以及 SeqTs 遥测头。

// 子模块声明
mod ethernet;
mod icmpv4;
mod ipv4;
mod pfc;
mod seq_ts;
mod tcp;

// 重新导出公共接口
pub use ethernet::{ETHERTYPE_IPV4, ETHERTYPE_MAC_CONTROL, EthernetHeader, Mac};
pub use icmpv4::{Icmpv4Header, Icmpv4Kind};
pub use ipv4::{Ecn, Ipv4Header, PROTO_ICMP, PROTO_TCP};
pub use pfc::{PFC_OPCODE, PfcHeader};
pub use seq_ts::SeqTsHeader;
pub use tcp::{TcpFlags, TcpHeader};
