//! socket 契约
//!
//! 非阻塞 socket 风格 API 的公共部分：句柄、错误码与完成回调。
//! 所有调用立即返回；错误经 `last_error()` 同步可见，完成经回调异步可见。

use std::net::Ipv4Addr;

use crate::sim::Simulator;

/// socket 句柄：协议栈表内的索引（避免 socket/端点/栈之间的循环引用）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

/// 端点地址
pub type SockAddr = (Ipv4Addr, u16);

/// socket 错误码（POSIX 风格子集）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SockErrno {
    #[default]
    NotError,
    IsConn,
    NotConn,
    MsgSize,
    Again,
    Shutdown,
    OpNotSupp,
    AfNoSupport,
    Inval,
    BadF,
    NoRouteToHost,
    NoDev,
    AddrNotAvail,
    AddrInUse,
}

/// 完成回调集合。仅对应用可见的事件才会走回调；
/// 协议内部错误只会变成日志与状态迁移。
#[derive(Default)]
pub struct SocketHooks {
    pub on_connect: Option<Box<dyn FnMut(SocketId, &mut Simulator) + Send>>,
    pub on_connect_failed: Option<Box<dyn FnMut(SocketId, &mut Simulator) + Send>>,
    /// 监听 socket 接纳了一个连接请求（SYN 已应答，握手尚未完成）
    pub on_accept: Option<Box<dyn FnMut(SockAddr, &mut Simulator) + Send>>,
    /// 监听 socket 收到新连接：参数为子 socket 与对端地址
    pub on_new_connection: Option<Box<dyn FnMut(SocketId, SockAddr, &mut Simulator) + Send>>,
    pub on_data_sent: Option<Box<dyn FnMut(SocketId, u32, &mut Simulator) + Send>>,
    pub on_send_space: Option<Box<dyn FnMut(SocketId, u32, &mut Simulator) + Send>>,
    pub on_recv: Option<Box<dyn FnMut(SocketId, &mut Simulator) + Send>>,
    pub on_normal_close: Option<Box<dyn FnMut(SocketId, &mut Simulator) + Send>>,
    pub on_error_close: Option<Box<dyn FnMut(SocketId, &mut Simulator) + Send>>,
}

impl std::fmt::Debug for SocketHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHooks").finish_non_exhaustive()
    }
}
