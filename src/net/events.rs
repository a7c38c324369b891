//! 链路事件
//!
//! 两类事件驱动全部链路行为：`LinkReady` 表示串行化完成（或暂停解除
//! 的重试点），`DeliverPacket` 表示帧经传播时延后抵达对端。

use crate::packet::Packet;
use crate::sim::{Event, Simulator, World};
use crate::switch::MmuTag;

use super::id::{LinkId, NodeId, PortNo};
use super::net_world::NetWorld;

/// 串行化完成 / 重试踢动。
#[derive(Debug)]
pub struct LinkReady {
    pub link: LinkId,
    pub dir: usize,
}

impl Event for LinkReady {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(nw) = world.as_any_mut().downcast_mut::<NetWorld>() else {
            return;
        };
        nw.net.on_link_ready(self.link, self.dir, sim);
    }
}

/// 帧抵达对端节点。
#[derive(Debug)]
pub struct DeliverPacket {
    pub link: LinkId,
    pub dir: usize,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(nw) = world.as_any_mut().downcast_mut::<NetWorld>() else {
            return;
        };
        nw.net.on_deliver(self.link, self.dir, self.pkt, sim);
    }
}

/// 交换机出队的 MMU 记账归还。
/// 同时刻事件：出队发生在发送节点自身的处理过程中，直接归还会
/// 与被取出的节点冲突。
#[derive(Debug)]
pub struct DequeueCredit {
    pub node: NodeId,
    pub tag: MmuTag,
    pub port: PortNo,
    pub pg: u8,
    pub bytes: u64,
}

impl Event for DequeueCredit {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(nw) = world.as_any_mut().downcast_mut::<NetWorld>() else {
            return;
        };
        nw.net
            .on_dequeue_credit(self.node, &self.tag, self.port, self.pg, self.bytes, sim);
    }
}
