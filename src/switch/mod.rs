//! 交换机
//!
//! 数据面（选路/ECN/PFC）与 Broadcom 风格缓冲管理器。

mod datapath;
mod mmu;

pub use datapath::{Switch, SwitchConfig};
pub use mmu::{IngressCharge, Mmu, MmuConfig, MmuTag};
