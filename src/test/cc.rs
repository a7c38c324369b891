use crate::sim::Time;
use crate::tcp::{CcContext, CcVariant, DeadlineInfo, RttEstimator};

const MSS: u32 = 1000;

fn rtt_with_alpha(g: f64, marked: bool) -> RttEstimator {
    let mut r = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), g);
    r.on_sent(1, 1000, Time(0), false);
    r.on_ack(1001, Time(1000), marked);
    r
}

fn ctx(now: Time, flight: u32, rtt: &RttEstimator) -> CcContext<'_> {
    CcContext {
        now,
        flight,
        rtt,
        deadline: None,
    }
}

#[test]
fn reno_slow_start_grows_per_acked_byte() {
    let mut cc = CcVariant::Reno.build(MSS, 2, u32::MAX / 2);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    assert_eq!(cc.cwnd(), 2 * MSS);
    assert_eq!(cc.initial_cwnd(), 2 * MSS);

    cc.on_new_ack(MSS, &ctx(Time(0), 0, &rtt));
    assert_eq!(cc.cwnd(), 3 * MSS);
    // 每 ACK 增量不超过一个 MSS
    cc.on_new_ack(5 * MSS, &ctx(Time(0), 0, &rtt));
    assert_eq!(cc.cwnd(), 4 * MSS);
}

#[test]
fn reno_congestion_avoidance_is_linear_per_rtt() {
    // ssthresh 低于初始 cwnd：直接进入拥塞避免
    let mut cc = CcVariant::Reno.build(MSS, 10, 5 * MSS);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    assert_eq!(cc.cwnd(), 10 * MSS);
    cc.on_new_ack(MSS, &ctx(Time(0), 0, &rtt));
    // mss^2 / cwnd = 100
    assert_eq!(cc.cwnd(), 10 * MSS + 100);
}

#[test]
fn reno_fast_retransmit_and_recovery() {
    let mut cc = CcVariant::Reno.build(MSS, 10, u32::MAX / 2);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    let flight = 10 * MSS;

    assert!(!cc.on_dup_ack(1, &ctx(Time(0), flight, &rtt)));
    assert!(!cc.on_dup_ack(2, &ctx(Time(0), flight, &rtt)));
    // 第 3 个 dupACK：ssthresh = flight/2，窗口膨胀 3 MSS，要求重传
    assert!(cc.on_dup_ack(3, &ctx(Time(0), flight, &rtt)));
    assert_eq!(cc.ssthresh(), 5 * MSS);
    assert_eq!(cc.cwnd(), 5 * MSS + 3 * MSS);

    // 恢复期内每个后续 dupACK 再膨胀一个 MSS
    assert!(!cc.on_dup_ack(4, &ctx(Time(0), flight, &rtt)));
    assert_eq!(cc.cwnd(), 9 * MSS);

    // 恢复期后的首个新 ACK：窗口收敛回 ssthresh
    cc.on_new_ack(MSS, &ctx(Time(0), flight, &rtt));
    assert_eq!(cc.cwnd(), 5 * MSS);
}

#[test]
fn tahoe_falls_back_to_slow_start_on_loss() {
    let mut cc = CcVariant::Tahoe.build(MSS, 10, u32::MAX / 2);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    assert!(cc.on_dup_ack(3, &ctx(Time(0), 10 * MSS, &rtt)));
    assert_eq!(cc.ssthresh(), 5 * MSS);
    assert_eq!(cc.cwnd(), MSS);
    // Tahoe 没有恢复期膨胀
    assert!(!cc.on_dup_ack(4, &ctx(Time(0), 10 * MSS, &rtt)));
    assert_eq!(cc.cwnd(), MSS);
}

#[test]
fn rto_collapses_window_to_one_segment() {
    let mut cc = CcVariant::Reno.build(MSS, 10, u32::MAX / 2);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    cc.on_rto(&ctx(Time(0), 8 * MSS, &rtt));
    assert_eq!(cc.ssthresh(), 4 * MSS);
    assert_eq!(cc.cwnd(), MSS);
}

#[test]
fn ssthresh_floor_is_two_segments() {
    let mut cc = CcVariant::Reno.build(MSS, 10, u32::MAX / 2);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    cc.on_rto(&ctx(Time(0), MSS, &rtt));
    assert_eq!(cc.ssthresh(), 2 * MSS);
}

#[test]
fn classic_ecn_echo_halves_window_and_pends_cwr() {
    let mut cc = CcVariant::Reno.build(MSS, 10, u32::MAX / 2);
    let rtt = RttEstimator::new(Time(1000), Time(1), Time(1_000_000), 0.0625);
    assert!(!cc.take_cwr());
    cc.on_ecn_echo(&ctx(Time(0), 10 * MSS, &rtt));
    assert_eq!(cc.cwnd(), 5 * MSS);
    // CWR 恰好取走一次
    assert!(cc.take_cwr());
    assert!(!cc.take_cwr());
}

#[test]
fn send_window_is_min_of_cwnd_and_rwnd() {
    let cc = CcVariant::Reno.build(MSS, 10, u32::MAX / 2);
    assert_eq!(cc.window(4 * MSS), 4 * MSS);
    assert_eq!(cc.window(64 * MSS), 10 * MSS);
}

#[test]
fn dctcp_cuts_by_alpha_at_most_once_per_rtt() {
    let mut cc = CcVariant::Dctcp.build(MSS, 10, u32::MAX / 2);
    let rtt = rtt_with_alpha(1.0, true); // alpha = 1.0, srtt = 1000
    assert_eq!(cc.cwnd(), 10 * MSS);

    cc.on_ecn_echo(&ctx(Time(2000), 10 * MSS, &rtt));
    // factor = 1 - alpha/2 = 0.5
    assert_eq!(cc.cwnd(), 5 * MSS);
    assert_eq!(cc.ssthresh(), 5 * MSS);
    assert!(cc.take_cwr());

    // 同一 RTT 内的回显不再缩窗
    cc.on_ecn_echo(&ctx(Time(2500), 10 * MSS, &rtt));
    assert_eq!(cc.cwnd(), 5 * MSS);

    // 一个 RTT 之后可以再缩
    cc.on_ecn_echo(&ctx(Time(3000), 10 * MSS, &rtt));
    assert_eq!(cc.cwnd(), 2500);
}

#[test]
fn dctcp_window_never_drops_below_one_segment() {
    let mut cc = CcVariant::Dctcp.build(MSS, 1, u32::MAX / 2);
    let rtt = rtt_with_alpha(1.0, true);
    cc.on_ecn_echo(&ctx(Time(2000), MSS, &rtt));
    assert_eq!(cc.cwnd(), MSS);
}

#[test]
fn d2tcp_near_deadline_flows_cut_less() {
    let rtt = rtt_with_alpha(0.25, true); // alpha = 0.25

    // 截止时间已过：惩罚 d = 2，缩幅最小
    let mut missed = CcVariant::D2tcp.build(MSS, 10, u32::MAX / 2);
    missed.on_ecn_echo(&CcContext {
        now: Time(2000),
        flight: 10 * MSS,
        rtt: &rtt,
        deadline: Some(DeadlineInfo {
            finish: Time(1000),
            bytes_to_tx: 1_000_000,
            bytes_sent: 0,
        }),
    });

    // 传输已完成：d = 0.5，缩幅最大
    let mut done = CcVariant::D2tcp.build(MSS, 10, u32::MAX / 2);
    done.on_ecn_echo(&CcContext {
        now: Time(2000),
        flight: 10 * MSS,
        rtt: &rtt,
        deadline: Some(DeadlineInfo {
            finish: Time(1_000_000),
            bytes_to_tx: 1000,
            bytes_sent: 1000,
        }),
    });

    assert!(missed.cwnd() > done.cwnd());
    // d=2: 1 - 0.25^2/2；d=0.5: 1 - 0.5/2
    assert_eq!(missed.cwnd(), (10_000f64 * (1.0 - 0.03125)) as u32);
    assert_eq!(done.cwnd(), (10_000f64 * 0.75) as u32);
}

#[test]
fn d2tcp_without_deadline_behaves_like_dctcp() {
    let rtt = rtt_with_alpha(1.0, true);
    let mut cc = CcVariant::D2tcp.build(MSS, 10, u32::MAX / 2);
    cc.on_ecn_echo(&ctx(Time(2000), 10 * MSS, &rtt));
    assert_eq!(cc.cwnd(), 5 * MSS);
}
