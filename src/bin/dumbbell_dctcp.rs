//! Dumbbell 拓扑 DCTCP 实验
//!
//! 单流经过一台 ECN 交换机到对端主机，观察 alpha 收敛与 cwnd 振荡。

use std::sync::{Arc, Mutex};

use clap::Parser;
use dcsim_rs::net::{NetWorld, Network};
use dcsim_rs::sim::{Event, Simulator, Time, World};
use dcsim_rs::switch::{MmuConfig, SwitchConfig};
use dcsim_rs::tcp::{CcVariant, SocketHooks, SocketId, TcpConfig};

#[derive(Debug, Parser)]
#[command(name = "dumbbell_dctcp", about = "DCTCP 单流 dumbbell 实验")]
struct Args {
    /// 传输字节数
    #[arg(long, default_value_t = 1_000_000)]
    bytes: u32,
    #[arg(long, default_value_t = 40)]
    host_link_gbps: u64,
    #[arg(long, default_value_t = 10)]
    bottleneck_gbps: u64,
    /// 单向链路传播时延（微秒）
    #[arg(long, default_value_t = 20)]
    link_latency_us: u64,
    /// ECN 标记阈值（字节）
    #[arg(long, default_value_t = 30_000)]
    ecn_k: u64,
    /// DCTCP 增益 g 的倒数
    #[arg(long, default_value_t = 16)]
    g_inv: u32,
    #[arg(long, default_value_t = 50)]
    until_ms: u64,
    /// 周期性输出 sock 状态 CSV（微秒间隔；0 关闭）
    #[arg(long, default_value_t = 0)]
    sample_us: u64,
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

/// 周期采样：time,cwnd,ssthresh,alpha
#[derive(Debug)]
struct Sample {
    sock: SocketId,
    every: Time,
    until: Time,
}

impl Event for Sample {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let Some(nw) = world.as_any_mut().downcast_mut::<NetWorld>() else {
            return;
        };
        if let Some(s) = nw.net.stack.sock(self.sock) {
            println!(
                "{},{},{},{:.4}",
                sim.now().as_secs_f64(),
                s.cc.cwnd(),
                s.cc.ssthresh(),
                s.rtt.alpha()
            );
        }
        if sim.now() + self.every <= self.until {
            let _ = sim.schedule_in(self.every, *self);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut sim = Simulator::default();
    let mut net = Network::new(args.seed);

    let h0 = net.add_host();
    let sw = net.add_switch(
        SwitchConfig {
            ecn_kmin: args.ecn_k,
            ecn_kmax: args.ecn_k,
            ..SwitchConfig::default()
        },
        MmuConfig::default(),
    );
    let h1 = net.add_host();
    let lat = Time::from_micros(args.link_latency_us as i64);
    net.connect(h0, sw, args.host_link_gbps * 1_000_000_000, lat);
    net.connect(sw, h1, args.bottleneck_gbps * 1_000_000_000, lat);

    let cfg = TcpConfig {
        ecn: true,
        cc: CcVariant::Dctcp,
        g: 1.0 / f64::from(args.g_inv),
        tx_buf_bytes: args.bytes.max(1 << 22),
        rx_buf_bytes: args.bytes.max(1 << 22),
        ..TcpConfig::default()
    };

    let server = net.stack.create(h1, cfg.clone());
    net.stack
        .bind(server, (Network::ip_of(h1), 5001))
        .expect("bind");
    net.stack.listen(server).expect("listen");

    let child_slot: Arc<Mutex<Option<SocketId>>> = Arc::new(Mutex::new(None));
    let slot = child_slot.clone();
    net.stack.set_hooks(server, SocketHooks {
        on_new_connection: Some(Box::new(move |child, peer, _sim| {
            tracing::info!(child = child.0, ?peer, "接入新连接");
            if let Ok(mut s) = slot.lock() {
                *s = Some(child);
            }
        })),
        ..SocketHooks::default()
    });

    let client = net.stack.create(h0, cfg);
    net.tcp_connect(client, (Network::ip_of(h1), 5001), &mut sim)
        .expect("connect");
    let data = vec![0xabu8; args.bytes as usize];
    let accepted = net.tcp_send(client, &data, &mut sim).expect("send");

    if args.sample_us > 0 {
        println!("time_s,cwnd,ssthresh,alpha");
        sim.schedule(Time::ZERO, Sample {
            sock: client,
            every: Time::from_micros(args.sample_us as i64),
            until: Time::from_millis(args.until_ms as i64),
        });
    }

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(args.until_ms as i64), &mut world);

    let net = &world.net;
    let delivered = match child_slot.lock().ok().and_then(|s| *s) {
        Some(child) => net.stack.rx_available(child),
        None => 0,
    };
    let (cwnd, alpha) = match net.stack.sock(client) {
        Some(s) => (s.cc.cwnd(), s.rtt.alpha()),
        None => (0, 0.0),
    };
    println!(
        "done @ {:?}: accepted={accepted} cwnd={cwnd} alpha={alpha:.4} rx_bytes={delivered}",
        sim.now()
    );
    match serde_json::to_string_pretty(&net.stats) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("stats export failed: {e}"),
    }
}
