//! 世界 trait
//!
//! 仿真世界接口：由业务层实现（网络拓扑/协议栈/统计等）。

use super::simulator::Simulator;
use std::any::Any;

/// 仿真世界。事件通过 `as_any_mut` 向下转型取得具体世界。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
