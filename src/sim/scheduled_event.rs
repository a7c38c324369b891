//! 调度事件
//!
//! 队列中的事件条目：执行时间、插入序号、取消票据与可选的日志上下文。

use super::event::Event;
use super::time::Time;
use std::cmp::Ordering;

/// 已入队的事件。`seq` 保证同一时刻的事件按插入顺序执行。
pub struct ScheduledEvent {
    pub(crate) at: Time,
    pub(crate) seq: u64,
    pub(crate) ticket: u64,
    /// 调度方附带的上下文（节点号等），仅用于日志。
    pub(crate) ctx: Option<u64>,
    pub(crate) ev: Box<dyn Event>,
}

// BinaryHeap 是 max-heap；需要最小时间优先，因此反向比较。
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.at.cmp(&other.at) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            ord => ord,
        }
        .reverse()
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}
