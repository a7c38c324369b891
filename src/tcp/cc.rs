//! 可插拔拥塞控制
//!
//! Tahoe / Reno（快速恢复）以及叠加其上的 DCTCP / D2TCP 窗口缩减路径。

use crate::sim::Time;
use tracing::debug;

use super::rtt::RttEstimator;

/// 截止时间信息（D2TCP 使用）
#[derive(Debug, Clone, Copy)]
pub struct DeadlineInfo {
    pub finish: Time,
    pub bytes_to_tx: u64,
    pub bytes_sent: u64,
}

/// 控制器钩子的调用上下文。
pub struct CcContext<'a> {
    pub now: Time,
    pub flight: u32,
    pub rtt: &'a RttEstimator,
    pub deadline: Option<DeadlineInfo>,
}

/// 拥塞控制接口。
pub trait CongestionControl: Send + std::fmt::Debug {
    fn cwnd(&self) -> u32;
    fn ssthresh(&self) -> u32;

    /// 发送窗口 = min(rwnd, cwnd)
    fn window(&self, rwnd: u32) -> u32 {
        self.cwnd().min(rwnd)
    }

    fn on_new_ack(&mut self, newly_acked: u32, ctx: &CcContext);
    /// 返回 true 表示应立即重传最早未确认段（第 3 个 dupACK）
    fn on_dup_ack(&mut self, count: u32, ctx: &CcContext) -> bool;
    fn on_rto(&mut self, ctx: &CcContext);
    /// ECN 回显钩子（DCTCP/D2TCP 缩窗路径）
    fn on_ecn_echo(&mut self, ctx: &CcContext);
    fn initial_cwnd(&self) -> u32;
    fn set_segment_size(&mut self, mss: u32);

    /// 取走一次"需要发送 CWR"状态（恰好标在一个数据段上）。
    fn take_cwr(&mut self) -> bool;
}

/// 控制器变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CcVariant {
    Tahoe,
    #[default]
    Reno,
    Dctcp,
    D2tcp,
}

impl CcVariant {
    /// DCTCP 家族：接收端按 CE 边界立即冲刷延迟 ACK。
    pub fn is_dctcp_family(self) -> bool {
        matches!(self, CcVariant::Dctcp | CcVariant::D2tcp)
    }

    pub fn build(self, mss: u32, init_cwnd_segs: u32, init_ssthresh: u32) -> Box<dyn CongestionControl> {
        let base = RenoCc::new(self == CcVariant::Tahoe, mss, init_cwnd_segs, init_ssthresh);
        match self {
            CcVariant::Tahoe | CcVariant::Reno => Box::new(base),
            CcVariant::Dctcp => Box::new(DctcpCc::new(base, false)),
            CcVariant::D2tcp => Box::new(DctcpCc::new(base, true)),
        }
    }
}

/// Tahoe/Reno 基础路径。
#[derive(Debug)]
pub struct RenoCc {
    tahoe: bool,
    mss: u32,
    cwnd: u32,
    ssthresh: u32,
    init_cwnd_segs: u32,
    in_fast_recovery: bool,
    cwr_pending: bool,
}

impl RenoCc {
    pub fn new(tahoe: bool, mss: u32, init_cwnd_segs: u32, init_ssthresh: u32) -> RenoCc {
        RenoCc {
            tahoe,
            mss,
            cwnd: mss.saturating_mul(init_cwnd_segs.max(1)),
            ssthresh: init_ssthresh,
            init_cwnd_segs: init_cwnd_segs.max(1),
            in_fast_recovery: false,
            cwr_pending: false,
        }
    }
}

impl CongestionControl for RenoCc {
    fn cwnd(&self) -> u32 {
        self.cwnd
    }

    fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    fn on_new_ack(&mut self, newly_acked: u32, _ctx: &CcContext) {
        if self.in_fast_recovery {
            // 快速恢复后的首个新 ACK：窗口收敛回 ssthresh
            self.cwnd = self.ssthresh;
            self.in_fast_recovery = false;
            return;
        }
        if self.cwnd < self.ssthresh {
            // 慢启动
            self.cwnd = self.cwnd.saturating_add(newly_acked.min(self.mss));
        } else {
            // 拥塞避免：每 ACK 增长 mss^2/cwnd（至少 1）
            let inc = (u64::from(self.mss) * u64::from(self.mss) / u64::from(self.cwnd.max(1)))
                .max(1) as u32;
            self.cwnd = self.cwnd.saturating_add(inc);
        }
    }

    fn on_dup_ack(&mut self, count: u32, ctx: &CcContext) -> bool {
        if count == 3 {
            self.ssthresh = (ctx.flight / 2).max(2 * self.mss);
            if self.tahoe {
                // Tahoe：回到慢启动
                self.cwnd = self.mss;
            } else {
                // Reno：快速恢复
                self.cwnd = self.ssthresh.saturating_add(3 * self.mss);
                self.in_fast_recovery = true;
            }
            debug!(
                ssthresh = self.ssthresh,
                cwnd = self.cwnd,
                tahoe = self.tahoe,
                "3 dupACK"
            );
            return true;
        }
        if count > 3 && !self.tahoe {
            self.cwnd = self.cwnd.saturating_add(self.mss);
        }
        false
    }

    fn on_rto(&mut self, ctx: &CcContext) {
        self.ssthresh = (ctx.flight / 2).max(2 * self.mss);
        self.cwnd = self.mss;
        self.in_fast_recovery = false;
    }

    fn on_ecn_echo(&mut self, ctx: &CcContext) {
        // 经典 ECN：视同一次拥塞事件，窗口减半
        self.ssthresh = (ctx.flight / 2).max(2 * self.mss);
        self.cwnd = self.ssthresh;
        self.cwr_pending = true;
    }

    fn initial_cwnd(&self) -> u32 {
        self.mss.saturating_mul(self.init_cwnd_segs)
    }

    fn set_segment_size(&mut self, mss: u32) {
        self.mss = mss;
    }

    fn take_cwr(&mut self) -> bool {
        std::mem::take(&mut self.cwr_pending)
    }
}

/// DCTCP / D2TCP：按 alpha（或 alpha^d）比例缩窗，叠加在 Reno/Tahoe 之上。
#[derive(Debug)]
pub struct DctcpCc {
    base: RenoCc,
    deadline_aware: bool,
    /// 上次缩窗时刻；每 RTT 至多缩一次
    last_cut_at: Option<Time>,
    /// ssthresh 跟随缩窗的限速时间戳
    last_ssthresh_update: Option<Time>,
}

impl DctcpCc {
    pub fn new(base: RenoCc, deadline_aware: bool) -> DctcpCc {
        DctcpCc {
            base,
            deadline_aware,
            last_cut_at: None,
            last_ssthresh_update: None,
        }
    }

    /// D2TCP 截止时间惩罚因子 d ∈ [0.5, 2.0]
    fn penalty(&self, ctx: &CcContext) -> f64 {
        let Some(dl) = ctx.deadline else {
            return 1.0;
        };
        let b = dl.bytes_to_tx as i64 - dl.bytes_sent as i64;
        if b <= 0 {
            return 0.5;
        }
        let d_left = dl.finish - ctx.now;
        if d_left <= Time::ZERO {
            return 2.0;
        }
        // Tc = B*RTT / (0.75*cwnd)
        let rtt_s = ctx.rtt.effective_rtt().as_secs_f64();
        let tc = b as f64 * rtt_s / (0.75 * f64::from(self.base.cwnd.max(1)));
        (tc / d_left.as_secs_f64()).clamp(0.5, 2.0)
    }
}

impl CongestionControl for DctcpCc {
    fn cwnd(&self) -> u32 {
        self.base.cwnd
    }

    fn ssthresh(&self) -> u32 {
        self.base.ssthresh
    }

    fn on_new_ack(&mut self, newly_acked: u32, ctx: &CcContext) {
        self.base.on_new_ack(newly_acked, ctx);
    }

    fn on_dup_ack(&mut self, count: u32, ctx: &CcContext) -> bool {
        self.base.on_dup_ack(count, ctx)
    }

    fn on_rto(&mut self, ctx: &CcContext) {
        self.base.on_rto(ctx);
    }

    fn on_ecn_echo(&mut self, ctx: &CcContext) {
        let rtt = ctx.rtt.effective_rtt();
        if let Some(last) = self.last_cut_at {
            if ctx.now - last < rtt {
                return; // 每 RTT 至多缩一次
            }
        }
        self.last_cut_at = Some(ctx.now);

        let alpha = ctx.rtt.alpha();
        let factor = if self.deadline_aware {
            let d = self.penalty(ctx);
            1.0 - alpha.powf(d) / 2.0
        } else {
            1.0 - alpha / 2.0
        };
        let mss = self.base.mss;
        let new_cwnd = ((f64::from(self.base.cwnd) * factor) as u32).max(mss);
        debug!(
            alpha,
            factor,
            old_cwnd = self.base.cwnd,
            new_cwnd,
            "DCTCP 缩窗"
        );
        self.base.cwnd = new_cwnd;
        self.base.cwr_pending = true;

        // ssthresh 跟随新窗口，但每 RTT 至多一次
        let may_update = match self.last_ssthresh_update {
            Some(t) => ctx.now - t >= rtt,
            None => true,
        };
        if may_update {
            self.base.ssthresh = new_cwnd;
            self.last_ssthresh_update = Some(ctx.now);
        }
    }

    fn initial_cwnd(&self) -> u32 {
        self.base.initial_cwnd()
    }

    fn set_segment_size(&mut self, mss: u32) {
        self.base.set_segment_size(mss);
    }

    fn take_cwr(&mut self) -> bool {
        self.base.take_cwr()
    }
}
