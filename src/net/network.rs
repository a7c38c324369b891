//! 网络拓扑与链路驱动
//!
//! Network 拥有全部节点、链路与 TCP 协议栈；链路的串行化/传播/损耗
//! 由 `LinkReady` 与 `DeliverPacket` 两类事件驱动。寻址为扁平 L2：
//! 节点 n 的 IP 固定为 10.0.0.0/8 内的 n+1，MAC 由节点号派生。

use std::io::Write;
use std::net::Ipv4Addr;

use rand::Rng;
use rand_pcg::Pcg64;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use crate::hdr::{ETHERTYPE_IPV4, EthernetHeader, Mac, PfcHeader};
use crate::packet::Packet;
use crate::pcap::PcapWriter;
use crate::sim::{Simulator, Time, TimeUnit};
use crate::switch::{MmuConfig, MmuTag, Switch, SwitchConfig};
use crate::tcp::{SockAddr, SockErrno, SocketId, TcpStack};

use super::events::{DeliverPacket, DequeueCredit, LinkReady};
use super::id::{LinkId, NodeId, PortNo};
use super::link::Link;
use super::node::{Host, NodeKind};
use super::stats::NetStats;

/// 仿真网络。
pub struct Network {
    pub stack: TcpStack,
    nodes: Vec<Option<NodeKind>>,
    links: Vec<Link>,
    /// 节点 -> 端口序（端口号 = 下标）
    ports: Vec<Vec<LinkId>>,
    pub stats: NetStats,
    rng: Pcg64,
    pcap: Option<PcapWriter<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Network {
    pub fn new(seed: u64) -> Network {
        Network {
            stack: TcpStack::new(),
            nodes: Vec::new(),
            links: Vec::new(),
            ports: Vec::new(),
            stats: NetStats::default(),
            rng: Pcg64::seed_from_u64(seed),
            pcap: None,
        }
    }

    // ---------------------------------------------------------------- 拓扑

    pub fn add_host(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(NodeKind::Host(Host::new(id))));
        self.ports.push(Vec::new());
        debug!(node = id.0, ip = %Self::ip_of(id), "添加主机");
        id
    }

    pub fn add_switch(&mut self, cfg: SwitchConfig, mmu: MmuConfig) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(NodeKind::Switch(Switch::new(id, cfg, mmu))));
        self.ports.push(Vec::new());
        debug!(node = id.0, "添加交换机");
        id
    }

    /// 建立全双工链路，返回句柄。
    pub fn connect(&mut self, a: NodeId, b: NodeId, rate_bps: u64, latency: Time) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::new(id, a, b, rate_bps, latency));
        self.ports[a.0].push(id);
        self.ports[b.0].push(id);
        info!(link = id.0, a = a.0, b = b.0, rate_bps, ?latency, "建立链路");
        id
    }

    pub fn set_loss(&mut self, link: LinkId, rate: f64) {
        self.links[link.0].loss_rate = rate;
    }

    /// 定点丢帧：丢弃该方向上第 `idxs` 个（0 起）进入串行化的帧。
    pub fn drop_frames(&mut self, link: LinkId, dir: usize, idxs: &[u64]) {
        self.links[link.0].ends[dir].drop_list.extend(idxs.iter().copied());
    }

    /// 抓包输出：所有进入串行化的帧都会写入。
    pub fn attach_pcap(&mut self, writer: PcapWriter<Box<dyn Write + Send>>) {
        self.pcap = Some(writer);
    }

    // ---------------------------------------------------------------- 寻址

    /// 节点 IP：10.x.y.z，z 从 1 起。
    pub fn ip_of(node: NodeId) -> Ipv4Addr {
        Ipv4Addr::from(0x0a00_0000u32 | (node.0 as u32 + 1))
    }

    pub fn node_of_ip(&self, ip: Ipv4Addr) -> Option<NodeId> {
        let v = u32::from(ip);
        if v >> 24 != 10 {
            return None;
        }
        let idx = (v & 0x00ff_ffff).checked_sub(1)? as usize;
        (idx < self.nodes.len()).then_some(NodeId(idx))
    }

    pub fn ports_of(&self, node: NodeId) -> &[LinkId] {
        &self.ports[node.0]
    }

    pub fn port_no(&self, node: NodeId, link: LinkId) -> Option<PortNo> {
        self.ports[node.0].iter().position(|&l| l == link)
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// 交换机只读访问（观测 MMU 记账）。
    pub fn switch(&self, node: NodeId) -> Option<&Switch> {
        match self.nodes.get(node.0)?.as_ref()? {
            NodeKind::Switch(sw) => Some(sw),
            NodeKind::Host(_) => None,
        }
    }

    /// 某链路某方向上优先级 `prio` 队列的排队字节数。
    pub fn queue_bytes(&self, link: LinkId, dir: usize, prio: usize) -> u64 {
        self.links[link.0].ends[dir].queued_bytes[prio]
    }

    pub fn rng_f64(&mut self) -> f64 {
        self.rng.r#gen()
    }

    // ------------------------------------------------------------ TCP 应用面
    // 栈的协议动作要同时借用栈与网络，应用侧入口经 take 暂出协议栈。

    pub fn tcp_connect(
        &mut self,
        id: SocketId,
        remote: SockAddr,
        sim: &mut Simulator,
    ) -> Result<(), SockErrno> {
        let mut stack = std::mem::take(&mut self.stack);
        let r = stack.connect(id, remote, sim, self);
        self.stack = stack;
        r
    }

    pub fn tcp_send(
        &mut self,
        id: SocketId,
        data: &[u8],
        sim: &mut Simulator,
    ) -> Result<u32, SockErrno> {
        let mut stack = std::mem::take(&mut self.stack);
        let r = stack.send(id, data, sim, self);
        self.stack = stack;
        r
    }

    pub fn tcp_close(&mut self, id: SocketId, sim: &mut Simulator) -> Result<(), SockErrno> {
        let mut stack = std::mem::take(&mut self.stack);
        let r = stack.close(id, sim, self);
        self.stack = stack;
        r
    }

    // ---------------------------------------------------------------- 发送

    /// 主机发出 IP 包：补以太头并送入上行口队列。
    pub fn send_from_host(
        &mut self,
        node: NodeId,
        dst_ip: Ipv4Addr,
        prio: u8,
        mut pkt: Packet,
        sim: &mut Simulator,
    ) {
        let Some(dst) = self.node_of_ip(dst_ip) else {
            self.stats.no_route += 1;
            debug!(node = node.0, %dst_ip, "无路由，丢弃");
            return;
        };
        let eth = EthernetHeader {
            dst: Mac::from_node(dst.0),
            src: Mac::from_node(node.0),
            ethertype: ETHERTYPE_IPV4,
        };
        pkt.add_header(&eth);
        let Some(&lid) = self.ports[node.0].first() else {
            self.stats.no_route += 1;
            return;
        };
        let dir = self.links[lid.0].dir_from(node);
        self.enqueue(lid, dir, prio as usize, pkt, sim);
    }

    /// 在节点的指定端口上发出帧（交换机转发 / PFC 注入用）。
    pub fn send_on_port(
        &mut self,
        node: NodeId,
        port: PortNo,
        prio: usize,
        pkt: Packet,
        sim: &mut Simulator,
    ) {
        let lid = self.ports[node.0][port];
        let dir = self.links[lid.0].dir_from(node);
        self.enqueue(lid, dir, prio, pkt, sim);
    }

    pub fn enqueue(
        &mut self,
        lid: LinkId,
        dir: usize,
        prio: usize,
        pkt: Packet,
        sim: &mut Simulator,
    ) {
        let end = &mut self.links[lid.0].ends[dir];
        end.queued_bytes[prio] += u64::from(pkt.size());
        end.queues[prio].push_back(pkt);
        self.start_tx(lid, dir, sim);
    }

    /// 串行化下一帧：严格优先级、尊重 PFC 暂停、注入损耗。
    fn start_tx(&mut self, lid: LinkId, dir: usize, sim: &mut Simulator) {
        let now = sim.now();
        if self.links[lid.0].ends[dir].busy_until > now {
            return;
        }
        let picked = self.links[lid.0].ends[dir].pick(now);
        let Some((prio, mut pkt)) = picked else {
            // 队列非空但全部被暂停：在最早解除时刻重试
            if let Some(t) = self.links[lid.0].ends[dir].earliest_unpause() {
                if t > now {
                    sim.schedule(t, LinkReady { link: lid, dir });
                }
            }
            return;
        };

        // 交换机出队：MMU 归还走同时刻事件。发送节点可能正被取出
        // 处理当前帧，不能在此直接借用。
        if let Some(tag) = pkt.peek_packet_tag::<MmuTag>() {
            pkt.remove_packet_tag::<MmuTag>();
            let src = self.links[lid.0].src_of(dir);
            if let Some(port) = self.port_no(src, lid) {
                sim.schedule_now(DequeueCredit {
                    node: src,
                    tag,
                    port,
                    pg: prio as u8,
                    bytes: u64::from(pkt.size()),
                });
            }
        }

        let (tx, latency, loss_rate) = {
            let link = &self.links[lid.0];
            (link.tx_time(pkt.size()), link.latency, link.loss_rate)
        };
        self.links[lid.0].ends[dir].busy_until = now + tx;
        sim.schedule(now + tx, LinkReady { link: lid, dir });

        if let Some(w) = self.pcap.as_mut() {
            let t_ns = now.to_unit(TimeUnit::Ns).max(0) as u64;
            if let Err(e) = w.write_frame(t_ns, &pkt.to_bytes()) {
                warn!(%e, "pcap 写入失败，抓包文件可能不完整");
            }
        }

        let end = &mut self.links[lid.0].ends[dir];
        let idx = end.tx_count;
        end.tx_count += 1;
        if end.drop_list.remove(&idx) {
            self.stats.lost += 1;
            debug!(link = lid.0, dir, idx, uid = pkt.uid(), "定点丢帧 💥");
            return;
        }
        if loss_rate > 0.0 && self.rng.r#gen::<f64>() < loss_rate {
            self.stats.lost += 1;
            debug!(link = lid.0, dir, uid = pkt.uid(), "损耗注入丢帧 💥");
            return;
        }
        trace!(link = lid.0, dir, prio, size = pkt.size(), "开始串行化");
        sim.schedule(now + tx + latency, DeliverPacket {
            link: lid,
            dir,
            pkt,
        });
    }

    // ---------------------------------------------------------------- 事件入口

    pub(crate) fn on_link_ready(&mut self, lid: LinkId, dir: usize, sim: &mut Simulator) {
        self.start_tx(lid, dir, sim);
    }

    /// 出队记账归还（同时刻延迟执行，确保节点已放回表中）。
    pub(crate) fn on_dequeue_credit(
        &mut self,
        node: NodeId,
        tag: &MmuTag,
        port: PortNo,
        pg: u8,
        bytes: u64,
        sim: &mut Simulator,
    ) {
        let Some(mut n) = self.nodes[node.0].take() else {
            return;
        };
        if let NodeKind::Switch(sw) = &mut n {
            sw.on_dequeue(tag, port, pg, bytes, self, sim);
        }
        self.nodes[node.0] = Some(n);
    }

    pub(crate) fn on_deliver(
        &mut self,
        lid: LinkId,
        dir: usize,
        pkt: Packet,
        sim: &mut Simulator,
    ) {
        self.stats.delivered += 1;
        let dst = self.links[lid.0].dst_of(dir);
        let Some(port) = self.port_no(dst, lid) else {
            return;
        };
        let Some(mut node) = self.nodes[dst.0].take() else {
            return;
        };
        node.on_frame(port, pkt, self, sim);
        self.nodes[dst.0] = Some(node);
    }

    /// 收到 PFC：调整本节点该端口发送侧的暂停截止时间。
    pub fn apply_pfc(&mut self, node: NodeId, port: PortNo, pfc: &PfcHeader, sim: &mut Simulator) {
        let now = sim.now();
        let lid = self.ports[node.0][port];
        let dir = self.links[lid.0].dir_from(node);
        let mut resumed = false;
        for prio in 0..8 {
            if !pfc.enabled(prio as u8) {
                continue;
            }
            let q = pfc.quanta[prio];
            if q > 0 {
                let until = now + self.links[lid.0].pause_duration(q);
                self.links[lid.0].ends[dir].paused_until[prio] = until;
                debug!(node = node.0, port, prio, ?until, "PFC 暂停 ⏸️");
            } else {
                self.links[lid.0].ends[dir].paused_until[prio] = now;
                resumed = true;
                debug!(node = node.0, port, prio, "PFC 解除");
            }
        }
        if resumed {
            self.start_tx(lid, dir, sim);
        }
    }
}
