//! 点对点链路
//!
//! 链路 = 两端的设备发送侧 + 传播信道。每一侧持有按优先级分组的
//! 发送队列与 PFC 暂停截止时间；串行化时间 L/R 结束后帧进入信道，
//! 再经传播时延送达对端。

use std::collections::{HashSet, VecDeque};

use crate::packet::Packet;
use crate::sim::Time;

use super::id::{LinkId, NodeId};

/// 优先级数（PFC class 数）
pub const NUM_PRIO: usize = 8;

/// 链路一侧的发送状态。
#[derive(Debug, Default)]
pub struct LinkEnd {
    /// 按优先级分组的发送队列
    pub queues: [VecDeque<Packet>; NUM_PRIO],
    /// 各优先级排队字节数
    pub queued_bytes: [u64; NUM_PRIO],
    /// 串行化占用到何时
    pub busy_until: Time,
    /// PFC：各优先级暂停到何时
    pub paused_until: [Time; NUM_PRIO],
    /// 本侧已串行化的帧数
    pub tx_count: u64,
    /// 按序号定点丢帧（故障注入）
    pub drop_list: HashSet<u64>,
}

impl LinkEnd {
    pub fn total_queued(&self) -> u64 {
        self.queued_bytes.iter().sum()
    }

    /// 严格优先级调度：从高到低选第一个非空且未被暂停的队列。
    pub fn pick(&mut self, now: Time) -> Option<(usize, Packet)> {
        for prio in (0..NUM_PRIO).rev() {
            if self.queues[prio].is_empty() || self.paused_until[prio] > now {
                continue;
            }
            let pkt = self.queues[prio].pop_front()?;
            self.queued_bytes[prio] -= u64::from(pkt.size());
            return Some((prio, pkt));
        }
        None
    }

    /// 所有非空队列都被暂停时，最早的解除时刻。
    pub fn earliest_unpause(&self) -> Option<Time> {
        (0..NUM_PRIO)
            .filter(|&p| !self.queues[p].is_empty())
            .map(|p| self.paused_until[p])
            .min()
    }
}

/// 全双工点对点链路。
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    /// 两端节点；方向 0 为 a->b，方向 1 为 b->a
    pub a: NodeId,
    pub b: NodeId,
    pub rate_bps: u64,
    pub latency: Time,
    /// 每帧伯努利丢弃概率
    pub loss_rate: f64,
    pub ends: [LinkEnd; 2],
}

impl Link {
    pub fn new(id: LinkId, a: NodeId, b: NodeId, rate_bps: u64, latency: Time) -> Link {
        Link {
            id,
            a,
            b,
            rate_bps,
            latency,
            loss_rate: 0.0,
            ends: [LinkEnd::default(), LinkEnd::default()],
        }
    }

    /// 发送方向的源节点
    pub fn src_of(&self, dir: usize) -> NodeId {
        if dir == 0 { self.a } else { self.b }
    }

    /// 发送方向的目的节点
    pub fn dst_of(&self, dir: usize) -> NodeId {
        if dir == 0 { self.b } else { self.a }
    }

    /// 从 `node` 出发的方向下标
    pub fn dir_from(&self, node: NodeId) -> usize {
        if node == self.a { 0 } else { 1 }
    }

    /// `bytes` 字节的串行化时间
    pub fn tx_time(&self, bytes: u32) -> Time {
        Time::seconds(f64::from(bytes) * 8.0 / self.rate_bps as f64)
    }

    /// PFC quanta 换算为暂停时长（1 quanta = 512 bit-times）
    pub fn pause_duration(&self, quanta: u16) -> Time {
        Time::seconds(f64::from(quanta) * 512.0 / self.rate_bps as f64)
    }
}
