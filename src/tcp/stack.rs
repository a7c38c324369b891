//! TCP 协议栈
//!
//! 句柄式 API：socket 只是栈内表项，应用持有 `SocketId`。
//! 所有协议动作（握手、确认、重传、定时器）都经由栈完成，
//! 发包走 `Network::send_from_host`，收包由主机节点解析后回调 `on_segment`。

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{debug, info, trace, warn};

use crate::hdr::{Ecn, Ipv4Header, PROTO_TCP, TcpFlags, TcpHeader};
use crate::net::{Network, NodeId};
use crate::packet::Packet;
use crate::sim::{Simulator, Time};

use super::cc::{CcContext, DeadlineInfo};
use super::sock::{TcpConfig, TcpSocket};
use super::socket::{SockAddr, SockErrno, SocketHooks, SocketId};
use super::state::TcpState;
use super::timer::{TcpTimer, TimerKind};

type Hook = Option<Box<dyn FnMut(SocketId, &mut Simulator) + Send>>;

/// 主机侧 TCP 协议栈（全局一张表，socket 以 node 归属）。
#[derive(Debug)]
pub struct TcpStack {
    socks: HashMap<SocketId, TcpSocket>,
    /// (本端, 对端) -> socket
    demux: HashMap<(SockAddr, SockAddr), SocketId>,
    listeners: HashMap<SockAddr, SocketId>,
    next_id: u64,
    next_port: u16,
}

impl Default for TcpStack {
    fn default() -> Self {
        TcpStack {
            socks: HashMap::new(),
            demux: HashMap::new(),
            listeners: HashMap::new(),
            next_id: 1,
            next_port: 49152,
        }
    }
}

impl TcpStack {
    pub fn new() -> TcpStack {
        TcpStack::default()
    }

    // ---------------------------------------------------------------- 应用 API

    /// 创建 socket，归属于节点 `node`。
    pub fn create(&mut self, node: NodeId, cfg: TcpConfig) -> SocketId {
        let id = SocketId(self.next_id);
        self.next_id += 1;
        self.socks.insert(id, TcpSocket::new(id, node, cfg));
        debug!(sock = id.0, node = node.0, "创建 socket");
        id
    }

    pub fn set_hooks(&mut self, id: SocketId, hooks: SocketHooks) {
        if let Some(s) = self.socks.get_mut(&id) {
            s.hooks = hooks;
        }
    }

    /// D2TCP：设置流截止时间与总传输量。
    pub fn set_deadline(&mut self, id: SocketId, finish: Time, bytes_to_tx: u64) {
        if let Some(s) = self.socks.get_mut(&id) {
            s.deadline = Some(finish);
            s.bytes_to_tx = bytes_to_tx;
        }
    }

    /// 单独更新总传输量（截止时间不变）。
    pub fn set_bytes_to_tx(&mut self, id: SocketId, bytes: u64) {
        if let Some(s) = self.socks.get_mut(&id) {
            s.bytes_to_tx = bytes;
        }
    }

    pub fn bind(&mut self, id: SocketId, addr: SockAddr) -> Result<(), SockErrno> {
        let (ip, mut port) = addr;
        if port == 0 {
            port = self.alloc_port();
        }
        if self.listeners.contains_key(&(ip, port)) {
            return Err(SockErrno::AddrInUse);
        }
        let s = self.socks.get_mut(&id).ok_or(SockErrno::BadF)?;
        s.local = Some((ip, port));
        Ok(())
    }

    pub fn listen(&mut self, id: SocketId) -> Result<(), SockErrno> {
        let s = self.socks.get_mut(&id).ok_or(SockErrno::BadF)?;
        if s.state != TcpState::Closed {
            return Err(SockErrno::IsConn);
        }
        let local = s.local.ok_or(SockErrno::AddrNotAvail)?;
        s.state = TcpState::Listen;
        self.listeners.insert(local, id);
        info!(sock = id.0, ?local, "进入 LISTEN");
        Ok(())
    }

    /// 主动发起连接：发送 SYN（附 ECN 协商），进入 SYN_SENT。
    pub fn connect(
        &mut self,
        id: SocketId,
        remote: SockAddr,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> Result<(), SockErrno> {
        let mut s = self.socks.remove(&id).ok_or(SockErrno::BadF)?;
        if s.state != TcpState::Closed {
            self.socks.insert(id, s);
            return Err(SockErrno::IsConn);
        }
        // 已有本地绑定时沿用，未绑定才取临时端口
        let local = match s.local {
            Some(l) => l,
            None => {
                let l = (Network::ip_of(s.node), self.alloc_port());
                s.local = Some(l);
                l
            }
        };
        s.remote = Some(remote);
        s.state = TcpState::SynSent;
        s.retries_left = s.cfg.conn_retries;

        let mut flags = TcpFlags::SYN;
        if s.cfg.ecn {
            // ECN 协商：SYN 同时置 ECE|CWR
            flags = flags | TcpFlags::ECE | TcpFlags::CWR;
        }
        info!(sock = id.0, ?local, ?remote, "发起连接 🤝");
        Self::emit(&mut s, 0, &[], flags, false, false, sim, net);
        Self::arm_retx(&mut s, sim);
        self.demux.insert((local, remote), id);
        self.socks.insert(id, s);
        Ok(())
    }

    /// 追加应用数据；立即返回实际接受的字节数。
    pub fn send(
        &mut self,
        id: SocketId,
        data: &[u8],
        sim: &mut Simulator,
        net: &mut Network,
    ) -> Result<u32, SockErrno> {
        let s = self.socks.get_mut(&id).ok_or(SockErrno::BadF)?;
        if s.pending_close || s.fin_seq_tx.is_some() {
            s.last_err = SockErrno::Shutdown;
            return Err(SockErrno::Shutdown);
        }
        let connecting = matches!(s.state, TcpState::SynSent | TcpState::SynRcvd);
        if !s.state.can_send_data() && !connecting {
            s.last_err = SockErrno::NotConn;
            return Err(SockErrno::NotConn);
        }
        let n = s.tx.append(data);
        if n == 0 {
            s.last_err = SockErrno::MsgSize;
            return Err(SockErrno::MsgSize);
        }
        if s.state.can_send_data() {
            Self::send_pending(s, sim, net);
        }
        Ok(n)
    }

    /// 面向连接的 socket 忽略目的地址：等价于 `send`。
    pub fn send_to(
        &mut self,
        id: SocketId,
        data: &[u8],
        _addr: SockAddr,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> Result<u32, SockErrno> {
        self.send(id, data, sim, net)
    }

    /// 读出至多 `max` 个已按序到达的字节。
    pub fn recv(&mut self, id: SocketId, max: u32) -> Vec<u8> {
        match self.socks.get_mut(&id) {
            Some(s) => s.rx.extract(max),
            None => Vec::new(),
        }
    }

    /// 同 `recv`，并附带对端地址。
    pub fn recv_from(&mut self, id: SocketId, max: u32) -> Result<(Vec<u8>, SockAddr), SockErrno> {
        let s = self.socks.get_mut(&id).ok_or(SockErrno::BadF)?;
        let peer = s.remote.ok_or(SockErrno::NotConn)?;
        Ok((s.rx.extract(max), peer))
    }

    /// 关闭发送方向；数据发完后追加 FIN。
    pub fn close(
        &mut self,
        id: SocketId,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> Result<(), SockErrno> {
        let state = self.socks.get(&id).ok_or(SockErrno::BadF)?.state;
        match state {
            TcpState::Listen | TcpState::SynSent => {
                if let Some(mut sock) = self.socks.remove(&id) {
                    Self::cancel_all_timers(&mut sock, sim);
                    self.remove_from_tables(&sock);
                }
            }
            TcpState::Established | TcpState::SynRcvd => {
                let s = self.socks.get_mut(&id).ok_or(SockErrno::BadF)?;
                if s.unsent() == 0 {
                    Self::send_fin(s, sim, net);
                    s.state = TcpState::FinWait1;
                } else {
                    s.pending_close = true;
                }
            }
            TcpState::CloseWait => {
                let s = self.socks.get_mut(&id).ok_or(SockErrno::BadF)?;
                if s.unsent() == 0 {
                    Self::send_fin(s, sim, net);
                    s.state = TcpState::LastAck;
                } else {
                    s.pending_close = true;
                }
            }
            _ => return Err(SockErrno::NotConn),
        }
        Ok(())
    }

    pub fn tx_available(&self, id: SocketId) -> u32 {
        self.socks.get(&id).map(|s| s.tx.available()).unwrap_or(0)
    }

    pub fn rx_available(&self, id: SocketId) -> u32 {
        self.socks.get(&id).map(|s| s.rx.available()).unwrap_or(0)
    }

    pub fn last_error(&self, id: SocketId) -> SockErrno {
        self.socks.get(&id).map(|s| s.last_err).unwrap_or(SockErrno::BadF)
    }

    pub fn state(&self, id: SocketId) -> TcpState {
        self.socks.get(&id).map(|s| s.state).unwrap_or(TcpState::Closed)
    }

    pub fn sock(&self, id: SocketId) -> Option<&TcpSocket> {
        self.socks.get(&id)
    }

    fn alloc_port(&mut self) -> u16 {
        let p = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(49152);
        p
    }

    // ------------------------------------------------------------ 段接收入口

    /// 主机节点解析出 TCP 段后的入口。
    #[tracing::instrument(skip_all, fields(node = node.0, seq = th.seq, ack = th.ack))]
    pub fn on_segment(
        &mut self,
        node: NodeId,
        ip: &Ipv4Header,
        th: &TcpHeader,
        payload: &[u8],
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let local = (ip.dst, th.dst_port);
        let remote = (ip.src, th.src_port);
        let key = (local, remote);

        if let Some(&id) = self.demux.get(&key) {
            let Some(mut sock) = self.socks.remove(&id) else {
                return;
            };
            let pre = sock.state;
            Self::process_segment(&mut sock, ip, th, payload, sim, net);
            let post = sock.state;
            let parent = sock.parent;
            if post == TcpState::Closed {
                Self::cancel_all_timers(&mut sock, sim);
                self.demux.remove(&key);
                debug!(sock = id.0, "连接终结，移除分派表");
            } else {
                self.socks.insert(id, sock);
            }
            // 被动端握手完成：通知监听 socket
            if pre == TcpState::SynRcvd && post == TcpState::Established {
                if let Some(pid) = parent {
                    if let Some(p) = self.socks.get_mut(&pid) {
                        if let Some(f) = p.hooks.on_new_connection.as_mut() {
                            f(id, remote, sim);
                        }
                    }
                }
            }
            return;
        }

        // 监听分派：精确地址优先，其次任意地址
        if th.flags.contains(TcpFlags::SYN) && !th.flags.contains(TcpFlags::ACK) {
            let lid = self
                .listeners
                .get(&local)
                .or_else(|| self.listeners.get(&(Ipv4Addr::UNSPECIFIED, th.dst_port)))
                .copied();
            if let Some(lid) = lid {
                self.accept_syn(lid, local, remote, th, sim, net);
                return;
            }
        }

        if !th.flags.contains(TcpFlags::RST) {
            trace!(?local, ?remote, "无匹配连接，回应 RST");
            Self::send_rst_raw(net, sim, node, local, remote, th);
        }
    }

    /// LISTEN 收到 SYN：派生子 socket 并回 SYN-ACK。
    fn accept_syn(
        &mut self,
        lid: SocketId,
        local: SockAddr,
        remote: SockAddr,
        th: &TcpHeader,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let id = SocketId(self.next_id);
        self.next_id += 1;
        let Some(listener) = self.socks.get(&lid) else {
            return;
        };
        let mut child = listener.fork(id, local, remote);
        child.parent = Some(lid);
        child.rx.set_next_rx_seq(th.seq.wrapping_add(1));
        child.rwnd = u32::from(th.window);
        // ECN 协商：对端 SYN 携带 ECE|CWR 且本端启用才算成立
        child.ecn_enabled = child.cfg.ecn
            && th.flags.contains(TcpFlags::ECE)
            && th.flags.contains(TcpFlags::CWR);
        child.state = TcpState::SynRcvd;

        let mut flags = TcpFlags::SYN | TcpFlags::ACK;
        if child.ecn_enabled {
            flags = flags | TcpFlags::ECE;
        }
        info!(
            sock = id.0,
            listener = lid.0,
            ?remote,
            ecn = child.ecn_enabled,
            "派生被动连接"
        );
        Self::emit(&mut child, 0, &[], flags, false, false, sim, net);
        Self::arm_retx(&mut child, sim);
        self.demux.insert((local, remote), id);
        self.socks.insert(id, child);
        if let Some(listener) = self.socks.get_mut(&lid)
            && let Some(f) = listener.hooks.on_accept.as_mut()
        {
            f(remote, sim);
        }
    }

    fn process_segment(
        sock: &mut TcpSocket,
        ip: &Ipv4Header,
        th: &TcpHeader,
        payload: &[u8],
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let flags = th.flags;
        match sock.state {
            TcpState::SynSent => {
                if flags.contains(TcpFlags::RST) {
                    warn!(sock = sock.id.0, "SYN_SENT 收到 RST，连接失败");
                    Self::cancel_all_timers(sock, sim);
                    sock.state = TcpState::Closed;
                    sock.last_err = SockErrno::NoRouteToHost;
                    Self::fire(&mut sock.hooks.on_connect_failed, sock.id, sim);
                    return;
                }
                if flags.contains(TcpFlags::SYN)
                    && flags.contains(TcpFlags::ACK)
                    && th.ack == sock.next_tx_seq
                {
                    sock.rx.set_next_rx_seq(th.seq.wrapping_add(1));
                    sock.rwnd = u32::from(th.window);
                    // SYN-ACK 带 ECE（不含 CWR）表示对端同意 ECN
                    sock.ecn_enabled = sock.cfg.ecn
                        && flags.contains(TcpFlags::ECE)
                        && !flags.contains(TcpFlags::CWR);
                    sock.state = TcpState::Established;
                    if let Some(t) = sock.retx_timer.take() {
                        sim.cancel(t);
                    }
                    info!(sock = sock.id.0, ecn = sock.ecn_enabled, "连接建立 ✅");
                    Self::send_bare_ack(sock, sim, net);
                    Self::fire(&mut sock.hooks.on_connect, sock.id, sim);
                    Self::send_pending(sock, sim, net);
                }
                return;
            }
            TcpState::SynRcvd => {
                if flags.contains(TcpFlags::RST) {
                    Self::cancel_all_timers(sock, sim);
                    sock.state = TcpState::Closed;
                    return;
                }
                if flags.contains(TcpFlags::SYN) && !flags.contains(TcpFlags::ACK) {
                    // SYN 重复到达：重发 SYN-ACK
                    let mut f = TcpFlags::SYN | TcpFlags::ACK;
                    if sock.ecn_enabled {
                        f = f | TcpFlags::ECE;
                    }
                    Self::emit(sock, 0, &[], f, false, false, sim, net);
                    return;
                }
                if flags.contains(TcpFlags::ACK) && th.ack == sock.next_tx_seq {
                    sock.state = TcpState::Established;
                    if let Some(t) = sock.retx_timer.take() {
                        sim.cancel(t);
                    }
                    debug!(sock = sock.id.0, "被动端握手完成");
                    // 继续处理同段携带的数据
                } else {
                    return;
                }
            }
            TcpState::TimeWait => {
                if !flags.contains(TcpFlags::RST) {
                    Self::send_bare_ack(sock, sim, net);
                }
                return;
            }
            TcpState::Closed | TcpState::Listen => return,
            _ => {}
        }
        Self::process_live(sock, ip, th, payload, sim, net);
    }

    /// ESTABLISHED 及之后各态的统一处理管线。
    fn process_live(
        sock: &mut TcpSocket,
        ip: &Ipv4Header,
        th: &TcpHeader,
        payload: &[u8],
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let flags = th.flags;
        let s = th.seq;
        let l = payload.len() as u32;

        // 1. RST：立即终止
        if flags.contains(TcpFlags::RST) {
            warn!(sock = sock.id.0, "收到 RST，异常关闭");
            Self::abort(sock, sim, SockErrno::NotConn);
            return;
        }
        // 2. 非法 SYN：回 RST 并终止
        if flags.contains(TcpFlags::SYN) {
            Self::send_rst_from(sock, sim, net);
            Self::abort(sock, sim, SockErrno::Inval);
            return;
        }

        // 3. ACK 处理
        if flags.contains(TcpFlags::ACK) {
            Self::process_ack(sock, th, l, sim, net);
            if sock.state == TcpState::Closed {
                return;
            }
        }

        // 4. ECE 回显（发送侧）：仅在 ack 推进超过上次处理点时生效
        if flags.contains(TcpFlags::ECE)
            && sock.ecn_enabled
            && th.ack > sock.ecn_echo_seq
        {
            sock.ecn_echo_seq = th.ack;
            let ctx = CcContext {
                now: sim.now(),
                flight: sock.flight(),
                rtt: &sock.rtt,
                deadline: Self::deadline_info(sock),
            };
            sock.cc.on_ecn_echo(&ctx);
            Self::send_pending(sock, sim, net);
        }

        // 对端 CWR：清除经典 ECN 的锁存回显
        if flags.contains(TcpFlags::CWR) {
            Self::note_cwr(sock);
        }

        // 5. 数据处理
        if l > 0 {
            Self::process_data(sock, ip, s, payload, sim, net);
        }

        // 6. FIN 处理
        if flags.contains(TcpFlags::FIN) {
            Self::process_fin(sock, s.wrapping_add(l), sim, net);
        }
    }

    fn process_ack(
        sock: &mut TcpSocket,
        th: &TcpHeader,
        l: u32,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let n = th.ack;
        let snd_una = sock.snd_una();

        // 确认了从未发送的数据：协议错误
        if n > sock.high_tx_mark {
            warn!(sock = sock.id.0, ack = n, high = sock.high_tx_mark, "ACK 超出已发送范围");
            Self::send_rst_from(sock, sim, net);
            Self::abort(sock, sim, SockErrno::Inval);
            return;
        }

        sock.rwnd = u32::from(th.window);

        if n > snd_una {
            let newly_acked = n - snd_una;
            sock.rtt.on_ack(n, sim.now(), th.flags.contains(TcpFlags::ECE));
            sock.tx.discard_up_to(n.min(sock.tx.tail_seq()));
            sock.dup_ack_count = 0;
            // 重传回退后 ack 可能越过 next_tx_seq
            if n > sock.next_tx_seq {
                sock.next_tx_seq = n;
            }

            let ctx = CcContext {
                now: sim.now(),
                flight: sock.flight(),
                rtt: &sock.rtt,
                deadline: Self::deadline_info(sock),
            };
            sock.cc.on_new_ack(newly_acked, &ctx);
            trace!(
                sock = sock.id.0,
                ack = n,
                newly_acked,
                cwnd = sock.cc.cwnd(),
                "新 ACK"
            );

            // 本端 FIN 被确认
            if let Some(fs) = sock.fin_seq_tx {
                if n >= fs.wrapping_add(1) {
                    Self::on_our_fin_acked(sock, sim);
                    if sock.state == TcpState::Closed {
                        return;
                    }
                }
            }

            if sock.flight() == 0 {
                if let Some(t) = sock.retx_timer.take() {
                    sim.cancel(t);
                }
            } else {
                Self::arm_retx(sock, sim);
            }

            if sock.tx.available() > 0 {
                let avail = sock.tx.available();
                if let Some(f) = sock.hooks.on_send_space.as_mut() {
                    f(sock.id, avail, sim);
                }
            }
            Self::send_pending(sock, sim, net);
        } else if n == snd_una
            && l == 0
            && !th.flags.contains(TcpFlags::FIN)
            && sock.flight() > 0
        {
            sock.dup_ack_count += 1;
            let ctx = CcContext {
                now: sim.now(),
                flight: sock.flight(),
                rtt: &sock.rtt,
                deadline: Self::deadline_info(sock),
            };
            let retransmit = sock.cc.on_dup_ack(sock.dup_ack_count, &ctx);
            trace!(sock = sock.id.0, count = sock.dup_ack_count, "重复 ACK");
            if retransmit {
                debug!(sock = sock.id.0, seq = snd_una, "快速重传 🔁");
                Self::retransmit_head(sock, sim, net);
            }
            Self::send_pending(sock, sim, net);
        }

        // 零窗口：启动探测
        if sock.rwnd == 0 && sock.unsent() > 0 {
            Self::arm_persist(sock, sim);
        } else if sock.rwnd > 0 {
            if let Some(t) = sock.persist_timer.take() {
                sim.cancel(t);
            }
            sock.persist_backoff = sock.cfg.persist_timeout;
        }
    }

    fn process_data(
        sock: &mut TcpSocket,
        ip: &Ipv4Header,
        s: u32,
        payload: &[u8],
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        if !sock.state.can_receive_data() {
            return;
        }
        let l = payload.len() as u32;
        let next = sock.rx.next_rx_seq();
        let max_rx = sock.rx.max_rx_seq();

        // 完全越窗：旧段或超窗段，回一个裸 ACK 告知当前位置
        if s.wrapping_add(l) <= next || s >= max_rx {
            trace!(sock = sock.id.0, seq = s, next, "越窗数据段");
            Self::flush_ack(sock, sim, net);
            return;
        }

        // DCTCP 接收端：CE 状态翻转时立即按旧状态冲刷延迟 ACK
        if sock.ecn_enabled && sock.cfg.cc.is_dctcp_family() {
            let ce = ip.ecn.is_ce();
            if ce != sock.rx_ce_state {
                if sock.delack_count > 0 {
                    Self::flush_ack(sock, sim, net);
                }
                sock.rx_ce_state = ce;
            }
        } else if sock.ecn_enabled {
            // 经典 ECN：CE 锁存 ECE，直到对端 CWR
            if ip.ecn.is_ce() {
                sock.ece_latched = true;
            }
        }

        let in_order = s <= next;
        let before = sock.rx.available();
        sock.rx.add(s, payload);

        if !in_order {
            // 乱序：立即回 ACK 触发对端快速重传
            Self::flush_ack(sock, sim, net);
        } else {
            sock.delack_count += 1;
            if sock.delack_count >= sock.cfg.delack_max_count {
                Self::flush_ack(sock, sim, net);
            } else {
                Self::arm_delack(sock, sim);
            }
        }

        if sock.rx.available() > before {
            Self::fire(&mut sock.hooks.on_recv, sock.id, sim);
        }
    }

    fn process_fin(sock: &mut TcpSocket, fin_seq: u32, sim: &mut Simulator, net: &mut Network) {
        if fin_seq < sock.rx.next_rx_seq() {
            return; // 旧 FIN
        }
        sock.rx.set_fin_seq(fin_seq);
        if !sock.rx.fin_reached() {
            // 数据还有空洞，等重组完成
            Self::flush_ack(sock, sim, net);
            return;
        }
        debug!(sock = sock.id.0, fin_seq, state = ?sock.state, "收到对端 FIN");
        Self::flush_ack(sock, sim, net);
        match sock.state {
            TcpState::Established => {
                sock.state = TcpState::CloseWait;
                Self::fire(&mut sock.hooks.on_normal_close, sock.id, sim);
            }
            TcpState::FinWait1 => {
                // 本端 FIN 未被确认：同时关闭
                sock.state = TcpState::Closing;
            }
            TcpState::FinWait2 => {
                Self::enter_timewait(sock, sim);
            }
            _ => {}
        }
    }

    /// 对端 CWR 到达时清除经典 ECN 的锁存回显。
    /// DCTCP 家族逐包回显，不使用锁存。
    pub(super) fn note_cwr(sock: &mut TcpSocket) {
        if !sock.cfg.cc.is_dctcp_family() {
            sock.ece_latched = false;
        }
    }

    fn on_our_fin_acked(sock: &mut TcpSocket, sim: &mut Simulator) {
        match sock.state {
            TcpState::FinWait1 => sock.state = TcpState::FinWait2,
            TcpState::Closing => Self::enter_timewait(sock, sim),
            TcpState::LastAck => {
                Self::cancel_all_timers(sock, sim);
                sock.state = TcpState::Closed;
                Self::fire(&mut sock.hooks.on_normal_close, sock.id, sim);
            }
            _ => {}
        }
    }

    fn enter_timewait(sock: &mut TcpSocket, sim: &mut Simulator) {
        Self::cancel_all_timers(sock, sim);
        sock.state = TcpState::TimeWait;
        let wait = sock.cfg.msl * 2;
        if let Ok(t) = sim.schedule_in(
            wait,
            TcpTimer {
                sock: sock.id,
                kind: TimerKind::TimeWait,
            },
        ) {
            sock.timewait_timer = Some(t);
        }
        debug!(sock = sock.id.0, ?wait, "进入 TIME_WAIT");
        Self::fire(&mut sock.hooks.on_normal_close, sock.id, sim);
    }

    fn abort(sock: &mut TcpSocket, sim: &mut Simulator, err: SockErrno) {
        Self::cancel_all_timers(sock, sim);
        sock.state = TcpState::Closed;
        sock.last_err = err;
        Self::fire(&mut sock.hooks.on_error_close, sock.id, sim);
    }

    // ------------------------------------------------------------------ 发送

    /// 窗口允许的范围内持续发出数据段；缓冲排空后补发挂起的 FIN。
    fn send_pending(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        if !sock.state.can_send_data() && sock.state != TcpState::FinWait1 {
            return;
        }
        loop {
            let wnd = sock.cc.window(sock.rwnd);
            let room = wnd.saturating_sub(sock.flight());
            let unsent = sock.unsent();
            if unsent == 0 {
                break;
            }
            let n = sock.cfg.mss.min(unsent).min(room);
            if n == 0 {
                return; // 窗口耗尽；FIN 等数据发完再说
            }
            // Nagle：有在途数据时不发小段
            if n < sock.cfg.mss && sock.flight() > 0 && sock.cfg.nagle && !sock.pending_close {
                return;
            }
            let seq = sock.next_tx_seq;
            let bytes = sock.tx.copy_slice(seq, n);
            let cwr = sock.cc.take_cwr();
            let is_retx = seq < sock.high_tx_mark;
            if is_retx {
                sock.retx_segments += 1;
            }
            sock.rtt.on_sent(seq, n, sim.now(), is_retx);
            Self::emit(sock, seq, &bytes, TcpFlags::ACK, true, cwr, sim, net);
            sock.next_tx_seq = sock.next_tx_seq.wrapping_add(n);
            if sock.next_tx_seq > sock.high_tx_mark {
                sock.high_tx_mark = sock.next_tx_seq;
            }
            Self::arm_retx_if_idle(sock, sim);
            if let Some(f) = sock.hooks.on_data_sent.as_mut() {
                f(sock.id, n, sim);
            }
        }
        // 缓冲排空：close() 挂起的 FIN 现在可以发出
        if sock.pending_close && sock.fin_seq_tx.is_none() {
            Self::send_fin(sock, sim, net);
            sock.pending_close = false;
            sock.state = match sock.state {
                TcpState::CloseWait => TcpState::LastAck,
                _ => TcpState::FinWait1,
            };
        }
    }

    /// 重传最早未确认段（快速重传 / RTO 路径共用）。
    fn retransmit_head(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        let seq = sock.snd_una();
        let n = sock.cfg.mss.min(sock.tx.size());
        if n > 0 {
            let bytes = sock.tx.copy_slice(seq, n);
            sock.rtt.on_sent(seq, n, sim.now(), true);
            sock.retx_segments += 1;
            Self::emit(sock, seq, &bytes, TcpFlags::ACK, true, false, sim, net);
            if sock.next_tx_seq < seq.wrapping_add(n) {
                sock.next_tx_seq = seq.wrapping_add(n);
            }
        } else if sock.fin_seq_tx == Some(seq) {
            Self::emit(
                sock,
                seq,
                &[],
                TcpFlags::FIN | TcpFlags::ACK,
                false,
                false,
                sim,
                net,
            );
        }
        Self::arm_retx(sock, sim);
    }

    fn send_fin(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        let seq = sock.next_tx_seq;
        sock.fin_seq_tx = Some(seq);
        sock.next_tx_seq = sock.next_tx_seq.wrapping_add(1);
        if sock.next_tx_seq > sock.high_tx_mark {
            sock.high_tx_mark = sock.next_tx_seq;
        }
        sock.rtt.on_sent(seq, 1, sim.now(), false);
        debug!(sock = sock.id.0, seq, "发送 FIN");
        Self::emit(
            sock,
            seq,
            &[],
            TcpFlags::FIN | TcpFlags::ACK,
            false,
            false,
            sim,
            net,
        );
        Self::arm_retx(sock, sim);
    }

    fn send_bare_ack(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        let seq = sock.next_tx_seq;
        Self::emit(sock, seq, &[], TcpFlags::ACK, false, false, sim, net);
    }

    /// 立即发出确认并复位延迟 ACK 状态。
    fn flush_ack(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        sock.delack_count = 0;
        if let Some(t) = sock.delack_timer.take() {
            sim.cancel(t);
        }
        Self::send_bare_ack(sock, sim, net);
    }

    /// 组装并发出一个段。`data_ect` 决定 IP 层是否打 ECT(1)。
    #[allow(clippy::too_many_arguments)]
    fn emit(
        sock: &mut TcpSocket,
        seq: u32,
        payload: &[u8],
        mut flags: TcpFlags,
        data_ect: bool,
        cwr: bool,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some((lip, lport)) = sock.local else {
            return;
        };
        let Some((rip, rport)) = sock.remote else {
            return;
        };
        let mut th = TcpHeader::new(lport, rport);
        th.seq = seq;
        th.window = sock.advertised_window();
        if flags.contains(TcpFlags::ACK) {
            th.ack = Self::ack_seq(sock);
        }
        // 回显：ACK 段携带接收侧的 ECN 状态（握手段由调用方显式给定）
        if sock.ecn_enabled && flags.contains(TcpFlags::ACK) && !flags.contains(TcpFlags::SYN) {
            let echo = if sock.cfg.cc.is_dctcp_family() {
                sock.rx_ce_state
            } else {
                sock.ece_latched
            };
            if echo {
                flags = flags | TcpFlags::ECE;
            }
        }
        if cwr {
            flags = flags | TcpFlags::CWR;
        }
        th.flags = flags;

        let mut pkt = if payload.is_empty() {
            Packet::new()
        } else {
            Packet::from_bytes(payload)
        };
        pkt.add_header(&th);
        let mut iph = Ipv4Header::new(lip, rip, PROTO_TCP, (payload.len() + 20) as u16);
        // 优先级进 DSCP，交换机据此选 PG/队列
        iph.dscp = sock.cfg.priority;
        if data_ect && sock.ecn_enabled {
            iph.ecn = Ecn::Ect1;
        }
        pkt.add_header(&iph);
        trace!(
            sock = sock.id.0,
            seq,
            ack = th.ack,
            len = payload.len(),
            %flags,
            "发出段"
        );
        net.send_from_host(sock.node, rip, sock.cfg.priority, pkt, sim);
    }

    /// 当前应当确认到的序号；FIN 收齐时额外 +1（FIN 占一个序号位）。
    fn ack_seq(sock: &TcpSocket) -> u32 {
        let n = sock.rx.next_rx_seq();
        if sock.rx.fin_reached() { n.wrapping_add(1) } else { n }
    }

    /// 对本连接的对端回 RST（协议错误路径）。
    fn send_rst_from(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        let Some((lip, lport)) = sock.local else {
            return;
        };
        let Some((rip, rport)) = sock.remote else {
            return;
        };
        let mut th = TcpHeader::new(lport, rport);
        th.seq = sock.next_tx_seq;
        th.flags = TcpFlags::RST;
        let mut pkt = Packet::new();
        pkt.add_header(&th);
        let iph = Ipv4Header::new(lip, rip, PROTO_TCP, 20);
        pkt.add_header(&iph);
        net.send_from_host(sock.node, rip, sock.cfg.priority, pkt, sim);
    }

    /// 对无匹配连接的来段回 RST。
    fn send_rst_raw(
        net: &mut Network,
        sim: &mut Simulator,
        node: NodeId,
        local: SockAddr,
        remote: SockAddr,
        th: &TcpHeader,
    ) {
        let mut rst = TcpHeader::new(local.1, remote.1);
        rst.flags = TcpFlags::RST | TcpFlags::ACK;
        rst.seq = if th.flags.contains(TcpFlags::ACK) { th.ack } else { 0 };
        rst.ack = th.seq.wrapping_add(1);
        let mut pkt = Packet::new();
        pkt.add_header(&rst);
        let iph = Ipv4Header::new(local.0, remote.0, PROTO_TCP, 20);
        pkt.add_header(&iph);
        net.send_from_host(node, remote.0, 0, pkt, sim);
    }

    // ---------------------------------------------------------------- 定时器

    fn arm_retx(sock: &mut TcpSocket, sim: &mut Simulator) {
        if let Some(t) = sock.retx_timer.take() {
            sim.cancel(t);
        }
        let delay = sock.cfg.user_rto.unwrap_or_else(|| sock.rtt.rto());
        if let Ok(t) = sim.schedule_in(
            delay,
            TcpTimer {
                sock: sock.id,
                kind: TimerKind::Retransmit,
            },
        ) {
            sock.retx_timer = Some(t);
        }
    }

    /// 仅在没有活动重传定时器时设置（数据发送路径）。
    fn arm_retx_if_idle(sock: &mut TcpSocket, sim: &mut Simulator) {
        let idle = match sock.retx_timer {
            Some(t) => sim.is_expired(t),
            None => true,
        };
        if idle {
            Self::arm_retx(sock, sim);
        }
    }

    fn arm_persist(sock: &mut TcpSocket, sim: &mut Simulator) {
        let armed = matches!(sock.persist_timer, Some(t) if !sim.is_expired(t));
        if armed {
            return;
        }
        if let Ok(t) = sim.schedule_in(
            sock.persist_backoff,
            TcpTimer {
                sock: sock.id,
                kind: TimerKind::Persist,
            },
        ) {
            sock.persist_timer = Some(t);
        }
    }

    fn arm_delack(sock: &mut TcpSocket, sim: &mut Simulator) {
        let armed = matches!(sock.delack_timer, Some(t) if !sim.is_expired(t));
        if armed {
            return;
        }
        if let Ok(t) = sim.schedule_in(
            sock.cfg.delack_timeout,
            TcpTimer {
                sock: sock.id,
                kind: TimerKind::DelAck,
            },
        ) {
            sock.delack_timer = Some(t);
        }
    }

    fn cancel_all_timers(sock: &mut TcpSocket, sim: &mut Simulator) {
        for slot in [
            &mut sock.retx_timer,
            &mut sock.persist_timer,
            &mut sock.delack_timer,
            &mut sock.timewait_timer,
        ] {
            if let Some(t) = slot.take() {
                sim.cancel(t);
            }
        }
    }

    /// 定时器事件入口。
    pub fn on_timer(
        &mut self,
        id: SocketId,
        kind: TimerKind,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(mut sock) = self.socks.remove(&id) else {
            return;
        };
        match kind {
            TimerKind::Retransmit => {
                sock.retx_timer = None;
                Self::on_retx_timeout(&mut sock, sim, net);
            }
            TimerKind::Persist => {
                sock.persist_timer = None;
                Self::on_persist_timeout(&mut sock, sim, net);
            }
            TimerKind::DelAck => {
                sock.delack_timer = None;
                if sock.delack_count > 0 {
                    sock.delack_count = 0;
                    Self::send_bare_ack(&mut sock, sim, net);
                }
            }
            TimerKind::TimeWait => {
                sock.timewait_timer = None;
                debug!(sock = id.0, "TIME_WAIT 到期");
                sock.state = TcpState::Closed;
            }
        }
        if sock.state == TcpState::Closed {
            Self::cancel_all_timers(&mut sock, sim);
            self.remove_from_tables(&sock);
        } else {
            self.socks.insert(id, sock);
        }
    }

    fn on_retx_timeout(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        match sock.state {
            TcpState::SynSent => {
                if sock.retries_left == 0 {
                    warn!(sock = sock.id.0, "连接超时 ❌");
                    sock.state = TcpState::Closed;
                    sock.last_err = SockErrno::NoRouteToHost;
                    Self::fire(&mut sock.hooks.on_connect_failed, sock.id, sim);
                    return;
                }
                sock.retries_left -= 1;
                sock.rtt.increase_multiplier();
                let mut flags = TcpFlags::SYN;
                if sock.cfg.ecn {
                    flags = flags | TcpFlags::ECE | TcpFlags::CWR;
                }
                debug!(sock = sock.id.0, left = sock.retries_left, "重发 SYN");
                Self::emit(sock, 0, &[], flags, false, false, sim, net);
                Self::arm_retx(sock, sim);
            }
            TcpState::SynRcvd => {
                if sock.retries_left == 0 {
                    sock.state = TcpState::Closed;
                    return;
                }
                sock.retries_left -= 1;
                sock.rtt.increase_multiplier();
                let mut flags = TcpFlags::SYN | TcpFlags::ACK;
                if sock.ecn_enabled {
                    flags = flags | TcpFlags::ECE;
                }
                Self::emit(sock, 0, &[], flags, false, false, sim, net);
                Self::arm_retx(sock, sim);
            }
            _ => {
                if sock.flight() == 0 {
                    return;
                }
                debug!(
                    sock = sock.id.0,
                    snd_una = sock.snd_una(),
                    rto = ?sock.rtt.rto(),
                    "RTO 超时 ⏰"
                );
                let ctx = CcContext {
                    now: sim.now(),
                    flight: sock.flight(),
                    rtt: &sock.rtt,
                    deadline: Self::deadline_info(sock),
                };
                sock.cc.on_rto(&ctx);
                sock.rtt.increase_multiplier();
                sock.rtt.clear_history();
                sock.dup_ack_count = 0;
                // 回退到最早未确认处重新发送
                sock.next_tx_seq = sock.snd_una();
                Self::retransmit_head(sock, sim, net);
            }
        }
    }

    fn on_persist_timeout(sock: &mut TcpSocket, sim: &mut Simulator, net: &mut Network) {
        if sock.rwnd > 0 {
            sock.persist_backoff = sock.cfg.persist_timeout;
            Self::send_pending(sock, sim, net);
            return;
        }
        // 一字节探测；不推进 next_tx_seq
        let seq = sock.next_tx_seq;
        let probe = sock.tx.copy_slice(seq, 1);
        if probe.is_empty() {
            Self::send_bare_ack(sock, sim, net);
        } else {
            Self::emit(sock, seq, &probe, TcpFlags::ACK, true, false, sim, net);
        }
        trace!(sock = sock.id.0, backoff = ?sock.persist_backoff, "零窗口探测");
        // 退避上限 60s
        sock.persist_backoff = (sock.persist_backoff * 2).min_of(Time::from_secs(60));
        Self::arm_persist(sock, sim);
    }

    fn remove_from_tables(&mut self, sock: &TcpSocket) {
        if let (Some(l), Some(r)) = (sock.local, sock.remote) {
            self.demux.remove(&(l, r));
        }
        if let Some(l) = sock.local {
            if self.listeners.get(&l) == Some(&sock.id) {
                self.listeners.remove(&l);
            }
        }
    }

    fn deadline_info(sock: &TcpSocket) -> Option<DeadlineInfo> {
        sock.deadline.map(|finish| DeadlineInfo {
            finish,
            bytes_to_tx: sock.bytes_to_tx,
            bytes_sent: sock.rtt.bytes_sent(),
        })
    }

    fn fire(hook: &mut Hook, id: SocketId, sim: &mut Simulator) {
        if let Some(f) = hook.as_mut() {
            f(id, sim);
        }
    }
}
