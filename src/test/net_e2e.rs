use std::sync::{Arc, Mutex};

use crate::net::{NetWorld, Network, NodeId};
use crate::sim::{Simulator, Time};
use crate::switch::{MmuConfig, SwitchConfig};
use crate::tcp::{CcVariant, SocketHooks, SocketId, TcpConfig, TcpState};

fn pattern(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

/// Listening socket on `node` whose accepted child id lands in the returned slot.
fn listen_with_child_slot(
    net: &mut Network,
    node: NodeId,
    cfg: &TcpConfig,
    port: u16,
) -> (SocketId, Arc<Mutex<Option<SocketId>>>) {
    let server = net.stack.create(node, cfg.clone());
    net.stack
        .bind(server, (Network::ip_of(node), port))
        .expect("bind");
    net.stack.listen(server).expect("listen");

    let slot: Arc<Mutex<Option<SocketId>>> = Arc::new(Mutex::new(None));
    let hook_slot = slot.clone();
    net.stack.set_hooks(server, SocketHooks {
        on_new_connection: Some(Box::new(move |child, _peer, _sim| {
            *hook_slot.lock().expect("slot lock") = Some(child);
        })),
        ..SocketHooks::default()
    });
    (server, slot)
}

fn child_of(slot: &Arc<Mutex<Option<SocketId>>>) -> SocketId {
    slot.lock().expect("slot lock").expect("connection accepted")
}

#[test]
fn transfer_delivers_all_bytes_in_order() {
    let mut sim = Simulator::default();
    let mut net = Network::new(1);
    let h0 = net.add_host();
    let sw = net.add_switch(SwitchConfig::default(), MmuConfig::default());
    let h1 = net.add_host();
    let rate = 10_000_000_000;
    net.connect(h0, sw, rate, Time::from_micros(1));
    net.connect(sw, h1, rate, Time::from_micros(1));

    let cfg = TcpConfig::default();
    let (_server, slot) = listen_with_child_slot(&mut net, h1, &cfg, 5001);

    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");
    let data = pattern(50_000);
    assert_eq!(
        net.tcp_send(client, &data, &mut sim).expect("send"),
        50_000
    );

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(10), &mut world);

    let child = child_of(&slot);
    assert_eq!(world.net.stack.state(client), TcpState::Established);
    assert_eq!(world.net.stack.state(child), TcpState::Established);
    assert_eq!(world.net.stack.rx_available(child), 50_000);
    let (bytes, peer) = world
        .net
        .stack
        .recv_from(child, 60_000)
        .expect("recv_from");
    assert_eq!(bytes, data);
    assert_eq!(peer.0, Network::ip_of(h0));
    assert_eq!(world.net.stats.lost, 0);
    assert_eq!(world.net.stats.admission_drops, 0);
}

#[test]
fn listener_reports_connection_requests() {
    let mut sim = Simulator::default();
    let mut net = Network::new(1);
    let h0 = net.add_host();
    let sw = net.add_switch(SwitchConfig::default(), MmuConfig::default());
    let h1 = net.add_host();
    let rate = 10_000_000_000;
    net.connect(h0, sw, rate, Time::from_micros(1));
    net.connect(sw, h1, rate, Time::from_micros(1));

    let cfg = TcpConfig::default();
    let server = net.stack.create(h1, cfg.clone());
    net.stack
        .bind(server, (Network::ip_of(h1), 5001))
        .expect("bind");
    net.stack.listen(server).expect("listen");

    let accepted: Arc<Mutex<Option<std::net::Ipv4Addr>>> = Arc::new(Mutex::new(None));
    let hook_peer = accepted.clone();
    net.stack.set_hooks(server, SocketHooks {
        on_accept: Some(Box::new(move |peer, _sim| {
            *hook_peer.lock().expect("peer lock") = Some(peer.0);
        })),
        ..SocketHooks::default()
    });

    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(1), &mut world);

    assert_eq!(
        *accepted.lock().expect("peer lock"),
        Some(Network::ip_of(h0))
    );
    assert_eq!(world.net.stack.state(client), TcpState::Established);
}

#[test]
fn close_walks_both_sides_through_the_state_machine() {
    let mut sim = Simulator::default();
    let mut net = Network::new(1);
    let h0 = net.add_host();
    let sw = net.add_switch(SwitchConfig::default(), MmuConfig::default());
    let h1 = net.add_host();
    let rate = 10_000_000_000;
    net.connect(h0, sw, rate, Time::from_micros(1));
    net.connect(sw, h1, rate, Time::from_micros(1));

    let cfg = TcpConfig::default();
    let (_server, slot) = listen_with_child_slot(&mut net, h1, &cfg, 5001);
    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");
    net.tcp_send(client, &pattern(3000), &mut sim).expect("send");

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(5), &mut world);
    let child = child_of(&slot);

    // 主动关闭端发 FIN；被动端进入 CLOSE_WAIT
    world.net.tcp_close(client, &mut sim).expect("close client");
    sim.run_until(Time::from_millis(10), &mut world);
    assert_eq!(world.net.stack.state(child), TcpState::CloseWait);
    assert_eq!(world.net.stack.state(client), TcpState::FinWait2);

    // 被动端关闭：LAST_ACK -> 回收；主动端停在 TIME_WAIT
    world.net.tcp_close(child, &mut sim).expect("close child");
    sim.run_until(Time::from_millis(15), &mut world);
    assert_eq!(world.net.stack.state(child), TcpState::Closed);
    assert_eq!(world.net.stack.state(client), TcpState::TimeWait);
}

#[test]
fn tahoe_fast_retransmit_recovers_a_dropped_segment() {
    let mut sim = Simulator::default();
    let mut net = Network::new(7);
    let h0 = net.add_host();
    let sw = net.add_switch(SwitchConfig::default(), MmuConfig::default());
    let h1 = net.add_host();
    let rate = 10_000_000_000;
    let uplink = net.connect(h0, sw, rate, Time::from_micros(1));
    net.connect(sw, h1, rate, Time::from_micros(1));

    // 上行第 81 帧 = 第 80 个数据段（0=SYN，1=裸 ACK，数据从 2 起）。
    // 丢得足够晚，丢包被发现时 cwnd 已超过 64 KiB 通告窗口，
    // 在途字节被 rwnd 钉死在 65535。
    let dir = net.link(uplink).dir_from(h0);
    net.drop_frames(uplink, dir, &[81]);

    let cfg = TcpConfig {
        cc: CcVariant::Tahoe,
        ..TcpConfig::default()
    };
    let (_server, slot) = listen_with_child_slot(&mut net, h1, &cfg, 5001);
    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");
    let data = pattern(300_000);
    net.tcp_send(client, &data, &mut sim).expect("send");

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(50), &mut world);

    let child = child_of(&slot);
    assert_eq!(world.net.stats.lost, 1);
    assert_eq!(world.net.stack.rx_available(child), 300_000);
    assert_eq!(world.net.stack.recv(child, 400_000), data);

    let sock = world.net.stack.sock(client).expect("client sock");
    // 恰好一次重传：快速重传补洞，之后没有虚假 RTO
    assert_eq!(sock.retx_segments, 1);
    // 触发时在途 = 65535，ssthresh = 在途的一半
    assert_eq!(sock.cc.ssthresh(), 65_535 / 2);
}

#[test]
fn dctcp_negotiates_ecn_and_keeps_alpha_in_band() {
    let mut sim = Simulator::default();
    let mut net = Network::new(1);
    let h0 = net.add_host();
    let sw = net.add_switch(
        SwitchConfig {
            ecn_kmin: 20_000,
            ecn_kmax: 20_000,
            ..SwitchConfig::default()
        },
        MmuConfig::default(),
    );
    let h1 = net.add_host();
    net.connect(h0, sw, 40_000_000_000, Time::from_micros(1));
    net.connect(sw, h1, 10_000_000_000, Time::from_micros(1));

    let cfg = TcpConfig {
        ecn: true,
        cc: CcVariant::Dctcp,
        g: 1.0 / 16.0,
        tx_buf_bytes: 8 << 20,
        rx_buf_bytes: 8 << 20,
        ..TcpConfig::default()
    };
    let (_server, slot) = listen_with_child_slot(&mut net, h1, &cfg, 5001);
    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");
    // 6 MB @ 10G ≈ 4.8 ms ≈ 200+ 个 RTT，远超 10/g 的收敛窗口
    let data = pattern(6_000_000);
    net.tcp_send(client, &data, &mut sim).expect("send");

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(20), &mut world);

    let child = child_of(&slot);
    assert_eq!(world.net.stack.rx_available(child), 6_000_000);
    assert!(world.net.stats.ecn_marked > 0, "bottleneck never marked CE");

    let client_sock = world.net.stack.sock(client).expect("client sock");
    let child_sock = world.net.stack.sock(child).expect("child sock");
    assert!(client_sock.ecn_enabled);
    assert!(child_sock.ecn_enabled);
    // 硬阈值下的稳态 alpha ≈ sqrt(2g) ≈ 0.35（g = 1/16）
    let alpha = client_sock.rtt.alpha();
    assert!(
        (0.05..=0.6).contains(&alpha),
        "alpha out of steady-state band: {alpha}"
    );
    // cwnd 在含队列 BDP（≈ 25 kB）附近振荡
    let cwnd = client_sock.cc.cwnd();
    assert!(
        (10_000..=50_000).contains(&cwnd),
        "cwnd far from the queue-inclusive BDP: {cwnd}"
    );
}

#[test]
fn pfc_pauses_then_resumes_and_mmu_drains_to_zero() {
    let mut sim = Simulator::default();
    let mut net = Network::new(1);
    let h0 = net.add_host();
    let sw = net.add_switch(
        // ECN 关闭，让缓冲增长触发 PFC
        SwitchConfig {
            ecn_kmin: u64::MAX,
            ecn_kmax: u64::MAX,
            ..SwitchConfig::default()
        },
        MmuConfig {
            pg_shared_limit_cell: 15_000,
            pg_hdrm_limit: 60_000,
            resume_offset_cell: 3_000,
            ..MmuConfig::default()
        },
    );
    let h1 = net.add_host();
    net.connect(h0, sw, 40_000_000_000, Time::from_micros(1));
    net.connect(sw, h1, 1_000_000_000, Time::from_micros(1));

    let cfg = TcpConfig::default();
    let (_server, slot) = listen_with_child_slot(&mut net, h1, &cfg, 5001);
    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");
    let data = pattern(200_000);
    net.tcp_send(client, &data, &mut sim).expect("send");

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(50), &mut world);

    let child = child_of(&slot);
    assert_eq!(world.net.stack.rx_available(child), 200_000);
    assert!(world.net.stats.pfc_pauses >= 1, "no PAUSE emitted");
    assert!(world.net.stats.pfc_resumes >= 1, "no resume emitted");
    // 头部空间足够吸收通告窗口内的在途字节：不应出现准入丢弃
    assert_eq!(world.net.stats.admission_drops, 0);

    let mmu = &world.net.switch(sw).expect("switch").mmu;
    assert!(mmu.totals_consistent());
    assert_eq!(mmu.total_used(), 0, "switch buffer not drained");

    // 占用上界：任一 (端口, PG) 的峰值不超过共享上限 + 头部空间
    let bound = mmu.cfg().pg_shared_limit_cell + mmu.cfg().pg_hdrm_limit;
    for p in 0..2 {
        for g in 0..8 {
            assert!(mmu.ingress_pg_peak(p, g) <= bound);
        }
    }
    // 确实越过共享上限进入过头部空间
    assert!(mmu.ingress_pg_peak(0, 3) > mmu.cfg().pg_shared_limit_cell);
}

#[test]
fn connect_keeps_an_explicit_local_binding() {
    let mut sim = Simulator::default();
    let mut net = Network::new(1);
    let h0 = net.add_host();
    let sw = net.add_switch(SwitchConfig::default(), MmuConfig::default());
    let h1 = net.add_host();
    let rate = 10_000_000_000;
    net.connect(h0, sw, rate, Time::from_micros(1));
    net.connect(sw, h1, rate, Time::from_micros(1));

    let cfg = TcpConfig::default();
    let (_server, slot) = listen_with_child_slot(&mut net, h1, &cfg, 5001);
    let client = net.stack.create(h0, cfg);
    net.stack
        .bind(client, (Network::ip_of(h0), 4321))
        .expect("bind");
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(1), &mut world);

    let child = child_of(&slot);
    let child_sock = world.net.stack.sock(child).expect("child sock");
    // 显式绑定的端口原样可见于对端，没有被临时端口覆盖
    assert_eq!(child_sock.remote, Some((Network::ip_of(h0), 4321)));
}
