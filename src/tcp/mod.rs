//! TCP 协议栈
//!
//! 完整连接生命周期（11 态状态机）、重组/重传缓冲、可插拔拥塞控制
//! （Tahoe/Reno/DCTCP/D2TCP）、RTT 估计与 DCTCP alpha。

// 子模块声明
mod cc;
mod rtt;
mod rx_buffer;
mod sock;
mod socket;
mod stack;
mod state;
mod timer;
mod tx_buffer;

// 重新导出公共接口
pub use cc::{CcContext, CcVariant, CongestionControl, DeadlineInfo};
pub use rtt::RttEstimator;
pub use rx_buffer::RxBuffer;
pub use sock::{TcpConfig, TcpSocket};
pub use socket::{SockAddr, SockErrno, SocketHooks, SocketId};
pub use stack::TcpStack;
pub use state::TcpState;
pub use timer::{TcpTimer, TimerKind};
pub use tx_buffer::TxBuffer;
