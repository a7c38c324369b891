use crate::switch::{Mmu, MmuConfig, MmuTag};

fn small_cfg() -> MmuConfig {
    MmuConfig {
        pg_min_cell: 100,
        port_min_cell: 200,
        pg_shared_limit_cell: 500,
        port_max_shared_cell: 10_000,
        pg_hdrm_limit: 300,
        buffer_cell_limit_sp_shared: 10_000,
        q_min_cell: 100,
        op_uc_port_config_cell: 10_000,
        op_buffer_shared_limit_cell: 10_000,
        resume_offset_cell: 100,
    }
}

fn tag(p: usize, g: u8, shared: u64, hdrm: u64, eg: u64) -> MmuTag {
    MmuTag {
        ingress_port: p,
        pg: g,
        ig_shared: shared,
        ig_hdrm: hdrm,
        eg_shared: eg,
    }
}

#[test]
fn admission_ladder_walks_reserve_then_shared_then_headroom() {
    let mut mmu = Mmu::new(small_cfg(), 2);

    // PG 保留
    let c = mmu.ingress_admit(0, 3, 80).expect("pg reserve");
    assert_eq!((c.shared, c.hdrm), (0, 0));
    mmu.ingress_commit(0, 3, 80, c);

    // PG 保留耗尽，端口保留接住
    let c = mmu.ingress_admit(0, 3, 80).expect("port reserve");
    assert_eq!((c.shared, c.hdrm), (0, 0));
    mmu.ingress_commit(0, 3, 80, c);

    // 两级保留都满：共享池只记超出保留的部分
    // over_pg = 240-100 = 140 (封顶 80)，over_port = 240-200 = 40
    let c = mmu.ingress_admit(0, 3, 80).expect("shared");
    assert_eq!((c.shared, c.hdrm), (40, 0));
    mmu.ingress_commit(0, 3, 80, c);

    // 填到共享上限附近
    while mmu.ingress_pg_used(0, 3) + 80 <= 500 {
        let c = mmu.ingress_admit(0, 3, 80).expect("shared fill");
        assert_eq!(c.hdrm, 0);
        mmu.ingress_commit(0, 3, 80, c);
    }

    // 超出共享上限：进入头部空间
    let c = mmu.ingress_admit(0, 3, 80).expect("headroom");
    assert_eq!((c.shared, c.hdrm), (0, 80));
    mmu.ingress_commit(0, 3, 80, c);
    assert!(mmu.should_pause(0, 3));
    assert_eq!(mmu.ingress_pg_peak(0, 3), mmu.ingress_pg_used(0, 3));
}

#[test]
fn shared_pool_charges_only_bytes_above_the_reserves() {
    let cfg = MmuConfig {
        pg_min_cell: 1000,
        port_min_cell: 0,
        pg_shared_limit_cell: 10_000,
        port_max_shared_cell: 10_000,
        pg_hdrm_limit: 0,
        buffer_cell_limit_sp_shared: 1000,
        q_min_cell: 0,
        op_uc_port_config_cell: 10_000,
        op_buffer_shared_limit_cell: 10_000,
        resume_offset_cell: 0,
    };
    let mut mmu = Mmu::new(cfg, 1);
    // 600 全在 PG 保留；600 超出保留 200；600 全超出。共享合计 800 <= 1000
    for expect in [0u64, 200, 600] {
        let c = mmu.ingress_admit(0, 0, 600).expect("admit");
        assert_eq!((c.shared, c.hdrm), (expect, 0));
        mmu.ingress_commit(0, 0, 600, c);
    }
    // 第 4 帧需要再记 600，超出共享池总量
    assert!(mmu.ingress_admit(0, 0, 600).is_none());
}

#[test]
fn egress_port_cap_bounds_a_single_port() {
    let mut cfg = small_cfg();
    cfg.op_uc_port_config_cell = 200;
    let mut mmu = Mmu::new(cfg, 2);
    let sh = mmu.egress_admit(0, 3, 150).expect("within cap");
    mmu.egress_commit(0, 3, 150, sh);
    assert!(mmu.egress_admit(0, 3, 80).is_none());
    // 其它端口不受影响
    assert!(mmu.egress_admit(1, 3, 80).is_some());
}

#[test]
fn headroom_exhaustion_rejects_the_frame() {
    let mut mmu = Mmu::new(small_cfg(), 1);
    // 直接灌满到 shared + hdrm 上限
    loop {
        match mmu.ingress_admit(0, 0, 80) {
            Some(c) => mmu.ingress_commit(0, 0, 80, c),
            None => break,
        }
    }
    assert!(mmu.ingress_admit(0, 0, 80).is_none());
    // 其它 PG 的保留不受影响
    assert!(mmu.ingress_admit(0, 1, 80).is_some());
}

#[test]
fn pause_fires_once_until_cleared() {
    let mut mmu = Mmu::new(small_cfg(), 1);
    assert!(!mmu.should_pause(0, 3));
    // 手工制造头部空间占用
    mmu.ingress_commit(0, 3, 80, crate::switch::IngressCharge { shared: 0, hdrm: 80 });
    assert!(mmu.should_pause(0, 3));
    mmu.set_paused(0, 3, true);
    assert!(!mmu.should_pause(0, 3));
}

#[test]
fn resume_needs_drained_headroom_and_hysteresis() {
    let mut mmu = Mmu::new(small_cfg(), 1);
    // 共享 450 + 头部空间 80
    mmu.ingress_commit(0, 3, 450, crate::switch::IngressCharge { shared: 450, hdrm: 0 });
    mmu.egress_commit(0, 3, 450, 450);
    mmu.ingress_commit(0, 3, 80, crate::switch::IngressCharge { shared: 0, hdrm: 80 });
    mmu.egress_commit(0, 3, 80, 80);
    mmu.set_paused(0, 3, true);

    // 头部空间未排空：不解除
    assert!(!mmu.should_resume(0, 3));
    mmu.release(&tag(0, 3, 0, 80, 80), 0, 3, 80);
    // 头部空间已排空，但 450 > 500 - 100：仍不解除
    assert!(!mmu.should_resume(0, 3));
    mmu.release(&tag(0, 3, 450, 0, 450), 0, 3, 450);
    assert!(mmu.should_resume(0, 3));
    assert!(mmu.totals_consistent());
    assert_eq!(mmu.total_used(), 0);
}

#[test]
fn egress_reserve_then_shared() {
    let mut mmu = Mmu::new(small_cfg(), 1);
    assert_eq!(mmu.egress_admit(0, 3, 80).expect("q reserve"), 0);
    mmu.egress_commit(0, 3, 80, 0);
    assert_eq!(mmu.egress_admit(0, 3, 80).expect("shared"), 80);
}

#[test]
fn release_restores_every_counter() {
    let mut mmu = Mmu::new(small_cfg(), 2);
    let frames = [(0usize, 3u8, 80u64), (0, 3, 80), (1, 5, 120)];
    let mut tags = Vec::new();
    for &(p, g, s) in &frames {
        let ig = mmu.ingress_admit(p, g, s).expect("ingress");
        let eg = mmu.egress_admit(1 - p, g, s).expect("egress");
        mmu.ingress_commit(p, g, s, ig);
        mmu.egress_commit(1 - p, g, s, eg);
        tags.push((tag(p, g, ig.shared, ig.hdrm, eg), 1 - p, g, s));
    }
    assert!(mmu.totals_consistent());
    assert_eq!(mmu.total_used(), 280);

    for (t, q, g, s) in tags {
        mmu.release(&t, q, g, s);
    }
    assert!(mmu.totals_consistent());
    assert_eq!(mmu.total_used(), 0);
    assert_eq!(mmu.ingress_pg_used(0, 3), 0);
}

#[test]
fn ensure_ports_grows_the_tables() {
    let mut mmu = Mmu::new(small_cfg(), 0);
    mmu.ensure_ports(4);
    let c = mmu.ingress_admit(3, 7, 50).expect("new port");
    mmu.ingress_commit(3, 7, 50, c);
    assert_eq!(mmu.ingress_pg_used(3, 7), 50);
}
