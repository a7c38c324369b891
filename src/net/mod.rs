//! 网络层
//!
//! 拓扑（主机/交换机/链路）、链路事件驱动与全网统计。

mod events;
mod id;
mod link;
mod net_world;
mod network;
mod node;
mod stats;

pub use events::{DeliverPacket, DequeueCredit, LinkReady};
pub use id::{LinkId, NodeId, PortNo};
pub use link::{Link, LinkEnd, NUM_PRIO};
pub use net_world::NetWorld;
pub use network::Network;
pub use node::{Host, NodeKind};
pub use stats::NetStats;
