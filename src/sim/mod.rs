//! 仿真核心模块
//!
//! 事件驱动仿真的核心组件：虚拟时间、事件、取消句柄与仿真器。

// 子模块声明
mod error;
mod event;
mod scheduled_event;
mod simulator;
mod time;
mod world;

// 重新导出公共接口
pub use error::SimError;
pub use event::Event;
pub use scheduled_event::ScheduledEvent;
pub use simulator::{EventId, Simulator};
pub use time::{Time, TimeUnit, set_resolution, time_resolution};
pub use world::World;
