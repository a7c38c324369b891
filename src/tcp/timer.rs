//! TCP 定时器事件
//!
//! 四类定时器共用一个事件类型；到期后经协议栈分派到对应 socket。
//! 取消采用惰性方式：socket 持有票据，重置时直接 `cancel` 旧票据。

use tracing::trace;

use crate::net::NetWorld;
use crate::sim::{Event, Simulator, World};

use super::socket::SocketId;

/// 定时器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// 重传（含 SYN/FIN 重发）
    Retransmit,
    /// 零窗口探测
    Persist,
    /// 延迟 ACK 冲刷
    DelAck,
    /// TIME_WAIT 到期（2*MSL）
    TimeWait,
}

/// 定时器到期事件。
#[derive(Debug)]
pub struct TcpTimer {
    pub sock: SocketId,
    pub kind: TimerKind,
}

impl Event for TcpTimer {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(nw) = world.as_any_mut().downcast_mut::<NetWorld>() else {
            return;
        };
        trace!(sock = self.sock.0, kind = ?self.kind, "TCP 定时器到期");
        // 栈与网络分离借用：先取出栈，处理完放回
        let mut stack = std::mem::take(&mut nw.net.stack);
        stack.on_timer(self.sock, self.kind, sim, &mut nw.net);
        nw.net.stack = stack;
    }
}
