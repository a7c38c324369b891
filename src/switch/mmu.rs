//! 缓冲管理器（Broadcom 风格准入）
//!
//! 入方向按 (端口, PG) 记账，阶梯准入：PG 保留 -> 端口保留 -> 共享池
//! -> 头部空间 -> 拒绝。帧进入头部空间即触发 PFC 暂停；PG 用量回落到
//! 共享上限减去滞回量以下时解除。出方向为保留 + 共享两级。
//! 所有计数以字节计（参数沿用 cell 命名）。

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::net::PortNo;

const NUM_PG: usize = 8;

/// 准入参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmuConfig {
    /// 每 (端口, PG) 的入方向保留
    pub pg_min_cell: u64,
    /// 每端口的入方向保留
    pub port_min_cell: u64,
    /// 每 (端口, PG) 在共享池中的上限
    pub pg_shared_limit_cell: u64,
    /// 每端口在共享池中的上限
    pub port_max_shared_cell: u64,
    /// 每 (端口, PG) 的头部空间
    pub pg_hdrm_limit: u64,
    /// 入方向共享池总量
    pub buffer_cell_limit_sp_shared: u64,
    /// 每 (端口, 队列) 的出方向保留
    pub q_min_cell: u64,
    /// 每出端口总量上限
    pub op_uc_port_config_cell: u64,
    /// 出方向共享池总量
    pub op_buffer_shared_limit_cell: u64,
    /// PFC 解除滞回
    pub resume_offset_cell: u64,
}

impl Default for MmuConfig {
    fn default() -> Self {
        MmuConfig {
            pg_min_cell: 2 * 1500,
            port_min_cell: 4 * 1500,
            pg_shared_limit_cell: 64 * 1500,
            port_max_shared_cell: 128 * 1500,
            pg_hdrm_limit: 16 * 1500,
            buffer_cell_limit_sp_shared: 512 * 1500,
            q_min_cell: 2 * 1500,
            op_uc_port_config_cell: 256 * 1500,
            op_buffer_shared_limit_cell: 512 * 1500,
            resume_offset_cell: 4 * 1500,
        }
    }
}

/// 入方向准入结果：本帧记到共享池 / 头部空间的字节数。
#[derive(Debug, Clone, Copy, Default)]
pub struct IngressCharge {
    pub shared: u64,
    pub hdrm: u64,
}

/// 帧在 MMU 中的记账凭据；出队时按此归还。
#[derive(Debug, Clone)]
pub struct MmuTag {
    pub ingress_port: PortNo,
    pub pg: u8,
    pub ig_shared: u64,
    pub ig_hdrm: u64,
    pub eg_shared: u64,
}

/// 单交换机的缓冲记账。
#[derive(Debug)]
pub struct Mmu {
    cfg: MmuConfig,
    total_used: u64,
    ingress_pg: Vec<[u64; NUM_PG]>,
    /// 历史峰值水位（按 (端口, PG)），用于校验占用上界
    ingress_pg_peak: Vec<[u64; NUM_PG]>,
    ingress_port: Vec<u64>,
    ingress_sp_shared: u64,
    hdrm_used: Vec<[u64; NUM_PG]>,
    egress_q: Vec<[u64; NUM_PG]>,
    egress_port: Vec<u64>,
    egress_sp_shared: u64,
    paused: Vec<[bool; NUM_PG]>,
}

impl Mmu {
    pub fn new(cfg: MmuConfig, n_ports: usize) -> Mmu {
        Mmu {
            cfg,
            total_used: 0,
            ingress_pg: vec![[0; NUM_PG]; n_ports],
            ingress_pg_peak: vec![[0; NUM_PG]; n_ports],
            ingress_port: vec![0; n_ports],
            ingress_sp_shared: 0,
            hdrm_used: vec![[0; NUM_PG]; n_ports],
            egress_q: vec![[0; NUM_PG]; n_ports],
            egress_port: vec![0; n_ports],
            egress_sp_shared: 0,
            paused: vec![[false; NUM_PG]; n_ports],
        }
    }

    /// 端口数随拓扑增长时补齐表项。
    pub fn ensure_ports(&mut self, n_ports: usize) {
        while self.ingress_pg.len() < n_ports {
            self.ingress_pg.push([0; NUM_PG]);
            self.ingress_pg_peak.push([0; NUM_PG]);
            self.ingress_port.push(0);
            self.hdrm_used.push([0; NUM_PG]);
            self.egress_q.push([0; NUM_PG]);
            self.egress_port.push(0);
            self.paused.push([false; NUM_PG]);
        }
    }

    pub fn cfg(&self) -> &MmuConfig {
        &self.cfg
    }

    pub fn total_used(&self) -> u64 {
        self.total_used
    }

    pub fn ingress_pg_used(&self, p: PortNo, g: u8) -> u64 {
        self.ingress_pg[p][usize::from(g)]
    }

    /// (端口, PG) 入方向占用的历史峰值。
    pub fn ingress_pg_peak(&self, p: PortNo, g: u8) -> u64 {
        self.ingress_pg_peak[p][usize::from(g)]
    }

    pub fn is_paused(&self, p: PortNo, g: u8) -> bool {
        self.paused[p][usize::from(g)]
    }

    /// 入方向阶梯准入；拒绝返回 None。
    pub fn ingress_admit(&self, p: PortNo, g: u8, s: u64) -> Option<IngressCharge> {
        let g = usize::from(g);
        let pg = self.ingress_pg[p][g];
        if pg + s <= self.cfg.pg_min_cell {
            return Some(IngressCharge::default());
        }
        if self.ingress_port[p] + s <= self.cfg.port_min_cell {
            return Some(IngressCharge::default());
        }
        // 共享池只记两级保留之上的部分
        let over_pg = (pg + s).saturating_sub(self.cfg.pg_min_cell).min(s);
        let over_port = (self.ingress_port[p] + s)
            .saturating_sub(self.cfg.port_min_cell)
            .min(s);
        let shared_part = over_pg.min(over_port);
        if self.ingress_sp_shared + shared_part <= self.cfg.buffer_cell_limit_sp_shared
            && pg + s <= self.cfg.pg_shared_limit_cell
            && self.ingress_port[p] + s <= self.cfg.port_max_shared_cell
        {
            return Some(IngressCharge {
                shared: shared_part,
                hdrm: 0,
            });
        }
        // 头部空间：仅吸收超出共享上限的部分
        if (pg + s).saturating_sub(self.cfg.pg_shared_limit_cell) <= self.cfg.pg_hdrm_limit
            && self.hdrm_used[p][g] + s <= self.cfg.pg_hdrm_limit
        {
            return Some(IngressCharge { shared: 0, hdrm: s });
        }
        None
    }

    pub fn ingress_commit(&mut self, p: PortNo, g: u8, s: u64, charge: IngressCharge) {
        let g = usize::from(g);
        self.ingress_pg[p][g] += s;
        self.ingress_pg_peak[p][g] = self.ingress_pg_peak[p][g].max(self.ingress_pg[p][g]);
        self.ingress_port[p] += s;
        self.total_used += s;
        self.ingress_sp_shared += charge.shared;
        self.hdrm_used[p][g] += charge.hdrm;
        trace!(
            port = p,
            pg = g,
            s,
            used = self.ingress_pg[p][g],
            "入方向记账"
        );
    }

    /// 出方向准入：返回记到共享池的字节数。
    pub fn egress_admit(&self, q: PortNo, g: u8, s: u64) -> Option<u64> {
        if self.egress_port[q] + s > self.cfg.op_uc_port_config_cell {
            return None;
        }
        let used = self.egress_q[q][usize::from(g)];
        if used + s <= self.cfg.q_min_cell {
            return Some(0);
        }
        if self.egress_sp_shared + s <= self.cfg.op_buffer_shared_limit_cell {
            return Some(s);
        }
        None
    }

    pub fn egress_commit(&mut self, q: PortNo, g: u8, s: u64, shared: u64) {
        self.egress_q[q][usize::from(g)] += s;
        self.egress_port[q] += s;
        self.egress_sp_shared += shared;
    }

    /// 出队归还：入/出两侧同时扣减。
    pub fn release(&mut self, tag: &MmuTag, q: PortNo, g: u8, s: u64) {
        let p = tag.ingress_port;
        let ig = usize::from(tag.pg);
        self.ingress_pg[p][ig] -= s;
        self.ingress_port[p] -= s;
        self.total_used -= s;
        self.ingress_sp_shared -= tag.ig_shared;
        self.hdrm_used[p][ig] -= tag.ig_hdrm;
        let g = usize::from(g);
        self.egress_q[q][g] -= s;
        self.egress_port[q] -= s;
        self.egress_sp_shared -= tag.eg_shared;
    }

    /// 帧进入头部空间且尚未暂停时需要发 PAUSE。
    pub fn should_pause(&self, p: PortNo, g: u8) -> bool {
        !self.paused[p][usize::from(g)] && self.hdrm_used[p][usize::from(g)] > 0
    }

    pub fn set_paused(&mut self, p: PortNo, g: u8, on: bool) {
        self.paused[p][usize::from(g)] = on;
    }

    /// PG 用量回落到共享上限减滞回以下时解除暂停。
    pub fn should_resume(&self, p: PortNo, g: u8) -> bool {
        let g = usize::from(g);
        self.paused[p][g]
            && self.hdrm_used[p][g] == 0
            && self.ingress_pg[p][g]
                <= self
                    .cfg
                    .pg_shared_limit_cell
                    .saturating_sub(self.cfg.resume_offset_cell)
    }

    /// 记账一致性：总量等于各端口入方向之和，也等于各出队列之和。
    pub fn totals_consistent(&self) -> bool {
        let ig: u64 = self.ingress_port.iter().sum();
        let eg: u64 = self.egress_q.iter().flatten().sum();
        self.total_used == ig && self.total_used == eg
    }
}
