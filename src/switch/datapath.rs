//! 交换机数据面
//!
//! 入方向：MMU 准入、MAC 学习（TTL 刷新）、单播/泛洪选路。
//! 出方向：入队时按队列水位做 RED 式 ECN 标记（Kmin..Kmax 线性），
//! 进入头部空间的 (端口, PG) 触发 PFC PAUSE，出队回落后解除。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::hdr::{
    ETHERTYPE_MAC_CONTROL, EthernetHeader, Ipv4Header, Mac, PfcHeader,
};
use crate::net::{Network, NodeId, PortNo};
use crate::packet::Packet;
use crate::sim::{Simulator, Time};

use super::mmu::{Mmu, MmuConfig, MmuTag};

/// 数据面参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// ECN 标记下限（字节）
    pub ecn_kmin: u64,
    /// ECN 标记上限（字节）；超过必标
    pub ecn_kmax: u64,
    /// Kmax 处的标记概率（Kmin..Kmax 线性插值）
    pub ecn_pmax: f64,
    /// MAC 表项存活时间
    pub mac_ttl: Time,
    /// PAUSE 帧的 quanta
    pub pfc_quanta: u16,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        SwitchConfig {
            ecn_kmin: 30_000,
            ecn_kmax: 90_000,
            ecn_pmax: 1.0,
            mac_ttl: Time::from_millis(100),
            pfc_quanta: u16::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FdbEntry {
    port: PortNo,
    expires: Time,
}

/// 学习型交换机。
#[derive(Debug)]
pub struct Switch {
    pub id: NodeId,
    pub cfg: SwitchConfig,
    pub mmu: Mmu,
    fdb: HashMap<Mac, FdbEntry>,
}

impl Switch {
    pub fn new(id: NodeId, cfg: SwitchConfig, mmu: MmuConfig) -> Switch {
        Switch {
            id,
            cfg,
            mmu: Mmu::new(mmu, 0),
            fdb: HashMap::new(),
        }
    }

    /// 帧从端口 `port` 进入。
    #[tracing::instrument(skip_all, fields(node = self.id.0, port))]
    pub fn on_frame(
        &mut self,
        port: PortNo,
        mut pkt: Packet,
        net: &mut Network,
        sim: &mut Simulator,
    ) {
        self.mmu.ensure_ports(net.ports_of(self.id).len());

        let eth = match pkt.remove_header::<EthernetHeader>() {
            Ok(h) => h,
            Err(e) => {
                warn!(%e, "以太头解析失败，丢弃");
                return;
            }
        };
        if eth.ethertype == ETHERTYPE_MAC_CONTROL {
            if let Ok(pfc) = pkt.remove_header::<PfcHeader>() {
                net.apply_pfc(self.id, port, &pfc, sim);
            }
            return;
        }

        // MAC 学习：端口变化即更新，存活期刷新
        let now = sim.now();
        self.fdb.insert(eth.src, FdbEntry {
            port,
            expires: now + self.cfg.mac_ttl,
        });

        let ip = match pkt.peek_header::<Ipv4Header>() {
            Ok(h) => h,
            Err(e) => {
                warn!(%e, "IP 头解析失败，丢弃");
                return;
            }
        };
        let g = ip.dscp & 7;
        let frame_bytes = u64::from(pkt.size()) + 14;

        // 选路：已知单播出端口，否则泛洪
        let n_ports = net.ports_of(self.id).len();
        let unicast = match self.fdb.get(&eth.dst) {
            Some(e) if e.expires > now && eth.dst != Mac::BROADCAST => Some(e.port),
            _ => None,
        };
        let targets: Vec<PortNo> = match unicast {
            Some(q) if q != port => vec![q],
            Some(_) => {
                trace!("目的端口即入端口，丢弃");
                return;
            }
            None => (0..n_ports).filter(|&q| q != port).collect(),
        };

        for (i, q) in targets.iter().copied().enumerate() {
            let last = i + 1 == targets.len();
            // 泛洪副本共享字节区
            let copy = if last { std::mem::take(&mut pkt) } else { pkt.clone() };
            self.admit_and_enqueue(port, q, g, frame_bytes, eth, copy, net, sim);
        }
    }

    /// 一份出端口拷贝的准入、标记与入队。
    #[allow(clippy::too_many_arguments)]
    fn admit_and_enqueue(
        &mut self,
        in_port: PortNo,
        out_port: PortNo,
        g: u8,
        frame_bytes: u64,
        eth: EthernetHeader,
        mut pkt: Packet,
        net: &mut Network,
        sim: &mut Simulator,
    ) {
        let Some(ig) = self.mmu.ingress_admit(in_port, g, frame_bytes) else {
            net.stats.admission_drops += 1;
            debug!(in_port, pg = g, bytes = frame_bytes, "入方向准入拒绝，丢弃");
            return;
        };
        let Some(eg_shared) = self.mmu.egress_admit(out_port, g, frame_bytes) else {
            net.stats.admission_drops += 1;
            debug!(out_port, pg = g, bytes = frame_bytes, "出方向准入拒绝，丢弃");
            return;
        };
        self.mmu.ingress_commit(in_port, g, frame_bytes, ig);
        self.mmu.egress_commit(out_port, g, frame_bytes, eg_shared);

        let tag = MmuTag {
            ingress_port: in_port,
            pg: g,
            ig_shared: ig.shared,
            ig_hdrm: ig.hdrm,
            eg_shared,
        };
        if pkt.add_packet_tag(tag).is_err() {
            // 不应发生：主机发出的帧不带 MMU 凭据
            warn!("重复 MMU 凭据");
        }

        // ECN 标记：按出队列水位线性插值
        if self.mark_decision(out_port, g, net) {
            let marked = match pkt.remove_header::<Ipv4Header>() {
                Ok(mut iph) => {
                    let m = iph.mark_ce_if_ect();
                    pkt.add_header(&iph);
                    m
                }
                Err(_) => false,
            };
            if marked {
                net.stats.ecn_marked += 1;
                trace!(out_port, pg = g, "CE 标记");
            }
        }
        pkt.add_header(&eth);
        net.send_on_port(self.id, out_port, usize::from(g), pkt, sim);

        // 本帧把 (端口, PG) 压入头部空间：向上游发 PAUSE
        if ig.hdrm > 0 && !self.mmu.is_paused(in_port, g) {
            self.mmu.set_paused(in_port, g, true);
            net.stats.pfc_pauses += 1;
            debug!(in_port, pg = g, "进入头部空间，发出 PAUSE 🚦");
            self.emit_pfc(in_port, g, self.cfg.pfc_quanta, net, sim);
        }
    }

    fn mark_decision(&self, out_port: PortNo, g: u8, net: &mut Network) -> bool {
        let lid = net.ports_of(self.id)[out_port];
        let dir = net.link(lid).dir_from(self.id);
        let fill = net.queue_bytes(lid, dir, usize::from(g));
        if fill >= self.cfg.ecn_kmax {
            return true;
        }
        if fill <= self.cfg.ecn_kmin || self.cfg.ecn_kmax == self.cfg.ecn_kmin {
            return false;
        }
        let p = (fill - self.cfg.ecn_kmin) as f64 / (self.cfg.ecn_kmax - self.cfg.ecn_kmin) as f64
            * self.cfg.ecn_pmax;
        net.rng_f64() < p
    }

    /// 帧离开出队列：归还记账并评估解除暂停。
    pub fn on_dequeue(
        &mut self,
        tag: &MmuTag,
        out_port: PortNo,
        g: u8,
        frame_bytes: u64,
        net: &mut Network,
        sim: &mut Simulator,
    ) {
        self.mmu.release(tag, out_port, g, frame_bytes);
        if self.mmu.should_resume(tag.ingress_port, tag.pg) {
            self.mmu.set_paused(tag.ingress_port, tag.pg, false);
            net.stats.pfc_resumes += 1;
            debug!(port = tag.ingress_port, pg = tag.pg, "发出 PAUSE 解除");
            self.emit_pfc(tag.ingress_port, tag.pg, 0, net, sim);
        }
    }

    /// 向端口上游发 PFC 帧；quanta 为 0 表示解除。
    fn emit_pfc(&self, port: PortNo, g: u8, quanta: u16, net: &mut Network, sim: &mut Simulator) {
        let pfc = if quanta > 0 {
            PfcHeader::pause(g, quanta)
        } else {
            PfcHeader::resume(g)
        };
        let mut pkt = Packet::new();
        pkt.add_header(&pfc);
        let eth = EthernetHeader {
            dst: Mac::BROADCAST,
            src: Mac::from_node(self.id.0),
            ethertype: ETHERTYPE_MAC_CONTROL,
        };
        pkt.add_header(&eth);
        // 控制帧走最高优先级，不受数据类 PAUSE 影响
        net.send_on_port(self.id, port, 7, pkt, sim);
    }
}
