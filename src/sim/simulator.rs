//! 仿真器
//!
//! 事件驱动仿真器：维护当前时间、事件队列与取消集合。
//! 单线程协作式：任一时刻只有一个事件在执行，事件内可继续调度未来事件。

use super::error::SimError;
use super::event::Event;
use super::scheduled_event::ScheduledEvent;
use super::time::Time;
use super::world::World;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info, trace};

/// 事件弱引用：仅是一张票据，drop 不会取消事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub(crate) u64);

/// 事件驱动仿真器。
#[derive(Default)]
pub struct Simulator {
    now: Time,
    next_seq: u64,
    next_ticket: u64,
    q: BinaryHeap<ScheduledEvent>,
    /// ticket -> 计划执行时间；弹出或取消后移除
    pending: HashMap<u64, Time>,
    /// 惰性取消：弹出时发现在集合中则静默丢弃
    cancelled: HashSet<u64>,
    stopped: bool,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> Time {
        self.now
    }

    /// 调度事件在绝对时间 `at` 执行
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: Time, ev: E) -> EventId {
        self.push(at, None, Box::new(ev))
    }

    /// 调度事件在 `now() + delay` 执行；负延迟是配置错误。
    pub fn schedule_in<E: Event>(&mut self, delay: Time, ev: E) -> Result<EventId, SimError> {
        if delay.is_negative() {
            return Err(SimError::InvalidDelay {
                delay_count: delay.0,
            });
        }
        Ok(self.push(self.now + delay, None, Box::new(ev)))
    }

    /// 调度事件在当前时刻执行：排在所有已入队的同时刻事件之后。
    pub fn schedule_now<E: Event>(&mut self, ev: E) -> EventId {
        self.push(self.now, None, Box::new(ev))
    }

    /// 带上下文的调度：`ctx`（节点号等）仅透传给日志。
    pub fn schedule_with_context<E: Event>(
        &mut self,
        ctx: u64,
        delay: Time,
        ev: E,
    ) -> Result<EventId, SimError> {
        if delay.is_negative() {
            return Err(SimError::InvalidDelay {
                delay_count: delay.0,
            });
        }
        Ok(self.push(self.now + delay, Some(ctx), Box::new(ev)))
    }

    fn push(&mut self, at: Time, ctx: Option<u64>, ev: Box<dyn Event>) -> EventId {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);

        trace!(now = ?self.now, seq, ticket, "调度事件");

        self.pending.insert(ticket, at);
        self.q.push(ScheduledEvent {
            at,
            seq,
            ticket,
            ctx,
            ev,
        });
        EventId(ticket)
    }

    /// 取消事件：O(1) 标记；对已执行或已取消的事件是 no-op。
    pub fn cancel(&mut self, id: EventId) {
        if self.pending.remove(&id.0).is_some() {
            self.cancelled.insert(id.0);
            trace!(ticket = id.0, "事件已取消");
        }
    }

    /// 事件是否已执行或已取消
    pub fn is_expired(&self, id: EventId) -> bool {
        !self.pending.contains_key(&id.0)
    }

    /// 距事件执行还剩多少时间；已失效返回 None。
    pub fn delay_left(&self, id: EventId) -> Option<Time> {
        self.pending.get(&id.0).map(|&at| at - self.now)
    }

    /// 请求停止：当前事件返回后驱动循环退出。
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// 在 `now() + delay` 插入停止哨兵。
    pub fn stop_in(&mut self, delay: Time) -> Result<EventId, SimError> {
        self.schedule_in(delay, StopSentinel)
    }

    /// 清空队列并复位时钟与计数器，使同进程内的连续运行从已知状态开始。
    pub fn destroy(&mut self) {
        self.q.clear();
        self.pending.clear();
        self.cancelled.clear();
        self.now = Time::ZERO;
        self.next_seq = 0;
        self.next_ticket = 0;
        self.stopped = false;
    }

    /// 弹出下一个未被取消的事件
    fn pop_live(&mut self) -> Option<ScheduledEvent> {
        while let Some(item) = self.q.pop() {
            if self.cancelled.remove(&item.ticket) {
                trace!(ticket = item.ticket, "丢弃已取消事件");
                continue;
            }
            self.pending.remove(&item.ticket);
            return Some(item);
        }
        None
    }

    fn peek_live_at(&mut self) -> Option<Time> {
        while let Some(top) = self.q.peek() {
            if self.cancelled.contains(&top.ticket) {
                let item = self.q.pop().expect("peek then pop");
                self.cancelled.remove(&item.ticket);
                continue;
            }
            return Some(top.at);
        }
        None
    }

    /// 运行直到事件队列为空、到达 `until` 或被 `stop()`。
    pub fn run_until(&mut self, until: Time, world: &mut dyn World) {
        self.stopped = false;
        while let Some(at) = self.peek_live_at() {
            if at > until {
                break;
            }
            let item = self.pop_live().expect("peeked live event");
            self.now = item.at;
            self.execute(item, world);
            if self.stopped {
                return;
            }
        }
        self.now = self.now.max_of(until);
    }

    /// 运行所有事件直到队列为空或被 `stop()`。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        self.stopped = false;
        let mut event_count: u64 = 0;
        while let Some(item) = self.pop_live() {
            event_count += 1;
            self.now = item.at;

            debug!(
                event_num = event_count,
                now = ?self.now,
                seq = item.seq,
                remaining_queue = self.q.len(),
                "执行事件"
            );

            self.execute(item, world);
            if self.stopped {
                info!(total_events = event_count, "🛑 仿真被停止");
                return;
            }
        }

        info!(
            total_events = event_count,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }

    fn execute(&mut self, item: ScheduledEvent, world: &mut dyn World) {
        if let Some(ctx) = item.ctx {
            trace!(ctx, at = ?item.at, "上下文事件");
        }
        item.ev.execute(self, world);
        world.on_tick(self);
    }
}

/// 停止哨兵：执行即请求驱动循环退出。
struct StopSentinel;

impl Event for StopSentinel {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        sim.stop();
    }
}
