//! TCP socket 状态
//!
//! 单个连接的全部可变状态：状态机、收发缓冲、定时器票据、ECN 状态、
//! 拥塞控制器与 RTT 估计器。协议动作在 `stack` 模块中实现。

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::sim::{EventId, Time};

use super::cc::{CcVariant, CongestionControl};
use super::rtt::RttEstimator;
use super::rx_buffer::RxBuffer;
use super::socket::{SockAddr, SockErrno, SocketHooks, SocketId};
use super::state::TcpState;
use super::tx_buffer::TxBuffer;
use crate::net::NodeId;

/// 每连接配置。
///
/// 序号按无符号 32 位直接比较，ISS 固定为 0：单条连接生存期内的
/// 传输量不得超过 4 GiB（不处理序号回绕）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// MSS（数据段载荷大小，字节）
    pub mss: u32,
    pub tx_buf_bytes: u32,
    pub rx_buf_bytes: u32,
    /// 初始 cwnd（单位：MSS 个数）
    pub init_cwnd_segs: u32,
    /// 初始 ssthresh（字节）
    pub init_ssthresh: u32,
    pub init_rtt: Time,
    pub min_rto: Time,
    pub max_rto: Time,
    /// 非零时覆盖 RTT 推导的 RTO
    pub user_rto: Option<Time>,
    pub delack_timeout: Time,
    pub delack_max_count: u32,
    pub persist_timeout: Time,
    /// TIME_WAIT = 2 * msl
    pub msl: Time,
    pub nagle: bool,
    pub ecn: bool,
    pub cc: CcVariant,
    /// DCTCP alpha 增益
    pub g: f64,
    /// 数据段的链路优先级（PFC/交换队列使用）
    pub priority: u8,
    pub conn_retries: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: 1460,
            tx_buf_bytes: 1 << 22,
            rx_buf_bytes: 1 << 22,
            init_cwnd_segs: 10,
            init_ssthresh: u32::MAX / 2,
            init_rtt: Time::from_micros(100),
            min_rto: Time::from_micros(200),
            max_rto: Time::from_millis(200),
            user_rto: None,
            delack_timeout: Time::from_micros(50),
            delack_max_count: 2,
            persist_timeout: Time::from_millis(1),
            msl: Time::from_secs(120),
            nagle: false,
            ecn: false,
            cc: CcVariant::Reno,
            g: 1.0 / 16.0,
            priority: 3,
            conn_retries: 6,
        }
    }
}

/// 一条 TCP 连接。
#[derive(Debug)]
pub struct TcpSocket {
    pub id: SocketId,
    pub node: NodeId,
    pub state: TcpState,
    pub local: Option<SockAddr>,
    pub remote: Option<SockAddr>,
    /// 被动连接的监听 socket（握手完成时通知）
    pub parent: Option<SocketId>,
    pub cfg: TcpConfig,

    // 发送方向
    pub tx: TxBuffer,
    pub next_tx_seq: u32,
    pub high_tx_mark: u32,
    pub dup_ack_count: u32,
    pub rwnd: u32,
    pub cc: Box<dyn CongestionControl>,
    pub rtt: RttEstimator,
    /// 重传过的数据段计数
    pub retx_segments: u64,
    /// 已发出 FIN 的序号
    pub fin_seq_tx: Option<u32>,
    /// 应用已 close，FIN 等待缓冲排空
    pub pending_close: bool,
    /// 剩余握手重试次数
    pub retries_left: u32,

    // 接收方向
    pub rx: RxBuffer,
    pub delack_count: u32,

    // ECN
    pub ecn_enabled: bool,
    /// 已处理过的最高 ECE 回显 ack（progress-only 判定）
    pub ecn_echo_seq: u32,
    /// DCTCP 接收端：当前 CE 状态（逐包回显）
    pub rx_ce_state: bool,
    /// 经典 ECN 接收端：锁存的 ECE（收到 CWR 清除）
    pub ece_latched: bool,

    // 定时器票据
    pub retx_timer: Option<EventId>,
    pub persist_timer: Option<EventId>,
    pub delack_timer: Option<EventId>,
    pub timewait_timer: Option<EventId>,
    pub persist_backoff: Time,

    // deadline-aware CC
    pub deadline: Option<Time>,
    pub bytes_to_tx: u64,

    pub last_err: SockErrno,
    pub hooks: SocketHooks,
}

impl TcpSocket {
    pub fn new(id: SocketId, node: NodeId, cfg: TcpConfig) -> TcpSocket {
        let iss = 0u32;
        let cc = cfg.cc.build(cfg.mss, cfg.init_cwnd_segs, cfg.init_ssthresh);
        let rtt = RttEstimator::new(cfg.init_rtt, cfg.min_rto, cfg.max_rto, cfg.g);
        TcpSocket {
            id,
            node,
            state: TcpState::Closed,
            local: None,
            remote: None,
            parent: None,
            tx: TxBuffer::new(iss + 1, cfg.tx_buf_bytes),
            next_tx_seq: iss + 1,
            high_tx_mark: iss + 1,
            dup_ack_count: 0,
            rwnd: u32::from(u16::MAX),
            cc,
            rtt,
            retx_segments: 0,
            fin_seq_tx: None,
            pending_close: false,
            retries_left: cfg.conn_retries,
            rx: RxBuffer::new(0, cfg.rx_buf_bytes),
            delack_count: 0,
            ecn_enabled: false,
            ecn_echo_seq: 0,
            rx_ce_state: false,
            ece_latched: false,
            retx_timer: None,
            persist_timer: None,
            delack_timer: None,
            timewait_timer: None,
            persist_backoff: cfg.persist_timeout,
            deadline: None,
            bytes_to_tx: 0,
            last_err: SockErrno::NotError,
            cfg,
            hooks: SocketHooks::default(),
        }
    }

    /// LISTEN 收到 SYN 时派生子 socket：配置深拷贝、全新收发缓冲。
    pub fn fork(&self, id: SocketId, local: SockAddr, remote: SockAddr) -> TcpSocket {
        let mut child = TcpSocket::new(id, self.node, self.cfg.clone());
        child.local = Some(local);
        child.remote = Some(remote);
        child
    }

    /// 第一个未确认字节
    pub fn snd_una(&self) -> u32 {
        self.tx.head_seq()
    }

    /// 在途字节数
    pub fn flight(&self) -> u32 {
        self.next_tx_seq.saturating_sub(self.snd_una())
    }

    /// 缓冲内尚未发出的字节数
    pub fn unsent(&self) -> u32 {
        self.tx.tail_seq().saturating_sub(self.next_tx_seq)
    }

    /// 通告窗口（无窗口缩放，上限 64 KiB）
    pub fn advertised_window(&self) -> u16 {
        self.rx.window().min(u32::from(u16::MAX)) as u16
    }

    /// 本地 ip；未绑定时 unspecified。
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local.map(|(ip, _)| ip).unwrap_or(Ipv4Addr::UNSPECIFIED)
    }
}
