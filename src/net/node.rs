//! 节点
//!
//! 主机：解析以太网/IP/TCP 并交给协议栈；PFC 帧直接作用于上行口。
//! 交换机实现在 `crate::switch`，这里只做分发。

use std::net::Ipv4Addr;

use tracing::{trace, warn};

use crate::hdr::{ETHERTYPE_MAC_CONTROL, EthernetHeader, Ipv4Header, Mac, PROTO_TCP, PfcHeader, TcpHeader};
use crate::packet::Packet;
use crate::sim::Simulator;
use crate::switch::Switch;

use super::id::{NodeId, PortNo};
use super::network::Network;

/// 节点分发
#[derive(Debug)]
pub enum NodeKind {
    Host(Host),
    Switch(Switch),
}

impl NodeKind {
    pub fn on_frame(
        &mut self,
        port: PortNo,
        pkt: Packet,
        net: &mut Network,
        sim: &mut Simulator,
    ) {
        match self {
            NodeKind::Host(h) => h.on_frame(port, pkt, net, sim),
            NodeKind::Switch(s) => s.on_frame(port, pkt, net, sim),
        }
    }
}

/// 端主机：单上行口，上面跑 TCP。
#[derive(Debug)]
pub struct Host {
    pub id: NodeId,
    pub mac: Mac,
    pub ip: Ipv4Addr,
}

impl Host {
    pub fn new(id: NodeId) -> Host {
        Host {
            id,
            mac: Mac::from_node(id.0),
            ip: Network::ip_of(id),
        }
    }

    fn on_frame(&mut self, port: PortNo, mut pkt: Packet, net: &mut Network, sim: &mut Simulator) {
        let eth = match pkt.remove_header::<EthernetHeader>() {
            Ok(h) => h,
            Err(e) => {
                warn!(node = self.id.0, %e, "以太头解析失败，丢弃");
                return;
            }
        };
        if eth.ethertype == ETHERTYPE_MAC_CONTROL {
            if let Ok(pfc) = pkt.remove_header::<PfcHeader>() {
                net.apply_pfc(self.id, port, &pfc, sim);
            }
            return;
        }
        if eth.dst != self.mac && eth.dst != Mac::BROADCAST {
            trace!(node = self.id.0, %eth, "非本机帧，忽略");
            return;
        }
        let ip = match pkt.remove_header::<Ipv4Header>() {
            Ok(h) => h,
            Err(e) => {
                warn!(node = self.id.0, %e, "IP 头解析失败，丢弃");
                return;
            }
        };
        if ip.protocol != PROTO_TCP {
            return;
        }
        let th = match pkt.remove_header::<TcpHeader>() {
            Ok(h) => h,
            Err(e) => {
                warn!(node = self.id.0, %e, "TCP 头解析失败，丢弃");
                return;
            }
        };
        let payload = pkt.to_bytes();
        // 协议栈与网络分离借用
        let mut stack = std::mem::take(&mut net.stack);
        stack.on_segment(self.id, &ip, &th, &payload, sim, net);
        net.stack = stack;
    }
}
