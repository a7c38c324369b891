//! 单元与集成测试

mod cc;
mod headers;
mod mmu;
mod net_e2e;
mod packet;
mod simulator;
mod tags;
