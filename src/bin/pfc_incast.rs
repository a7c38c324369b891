//! PFC incast 实验
//!
//! 多个发送端向同一出口灌注，共享池上限压低使入方向 PG 进入头部
//! 空间，观察 PAUSE 的发出与解除以及吞吐退让。

use clap::Parser;
use dcsim_rs::net::{NetWorld, Network};
use dcsim_rs::sim::{Simulator, Time};
use dcsim_rs::switch::{MmuConfig, SwitchConfig};
use dcsim_rs::tcp::{CcVariant, TcpConfig};

#[derive(Debug, Parser)]
#[command(name = "pfc_incast", about = "PFC 背压 incast 实验")]
struct Args {
    #[arg(long, default_value_t = 2)]
    senders: usize,
    /// 每个发送端的传输字节数
    #[arg(long, default_value_t = 500_000)]
    bytes: u32,
    #[arg(long, default_value_t = 10)]
    link_gbps: u64,
    #[arg(long, default_value_t = 5)]
    link_latency_us: u64,
    /// (端口, PG) 在共享池的上限（字节）
    #[arg(long, default_value_t = 50_000)]
    pg_shared_limit: u64,
    /// 头部空间（字节）
    #[arg(long, default_value_t = 25_000)]
    pg_hdrm: u64,
    #[arg(long, default_value_t = 20)]
    until_ms: u64,
    #[arg(long, default_value_t = 1)]
    seed: u64,
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

    let mmu = MmuConfig {
        pg_shared_limit_cell: args.pg_shared_limit,
        pg_hdrm_limit: args.pg_hdrm,
        ..MmuConfig::default()
    };
    // 关闭 ECN 标记，让缓冲增长触发 PFC
    let sw_cfg = SwitchConfig {
        ecn_kmin: u64::MAX,
        ecn_kmax: u64::MAX,
        ..SwitchConfig::default()
    };

    let sw = net.add_switch(sw_cfg, mmu);
    let sink = net.add_host();
    let rate = args.link_gbps * 1_000_000_000;
    let lat = Time::from_micros(args.link_latency_us as i64);
    net.connect(sw, sink, rate, lat);

    let cfg = TcpConfig {
        cc: CcVariant::Reno,
        tx_buf_bytes: args.bytes.max(1 << 22),
        rx_buf_bytes: (args.bytes * args.senders as u32).max(1 << 22),
        ..TcpConfig::default()
    };

    let server = net.stack.create(sink, cfg.clone());
    net.stack
        .bind(server, (Network::ip_of(sink), 9000))
        .expect("bind");
    net.stack.listen(server).expect("listen");

    let data = vec![0x5au8; args.bytes as usize];
    let mut clients = Vec::new();
    for _ in 0..args.senders {
        let h = net.add_host();
        net.connect(h, sw, rate, lat);
        let c = net.stack.create(h, cfg.clone());
        net.tcp_connect(c, (Network::ip_of(sink), 9000), &mut sim)
            .expect("connect");
        let _ = net.tcp_send(c, &data, &mut sim);
        clients.push(c);
    }

    let mut world = NetWorld::new(net);
    sim.run_until(Time::from_millis(args.until_ms as i64), &mut world);

    let net = &world.net;
    println!(
        "done @ {:?}: pauses={} resumes={} admission_drops={}",
        sim.now(),
        net.stats.pfc_pauses,
        net.stats.pfc_resumes,
        net.stats.admission_drops
    );
    match serde_json::to_string_pretty(&net.stats) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("stats export failed: {e}"),
    }
}
