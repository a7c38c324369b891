//! RTT 估计与 DCTCP alpha
//!
//! Jacobson/Karels：srtt/rttvar（alpha=1/8, beta=1/4），RTO = srtt + 4*var。
//! alpha 是"上个窗口内被 ECN 标记的已确认字节占比"的 EWMA（增益 g）。

use crate::sim::Time;
use tracing::trace;

/// 在途发送记录
#[derive(Debug, Clone)]
struct SentSeg {
    seq: u32,
    len: u32,
    sent_at: Time,
    /// 重传过的段不做 RTT 采样（Karn 规则）
    retransmitted: bool,
}

/// RTT 估计器。
#[derive(Debug)]
pub struct RttEstimator {
    srtt: Time,
    rttvar: Time,
    has_sample: bool,
    init_rtt: Time,
    min_rto: Time,
    max_rto: Time,
    /// RTO 退避倍数；新 ACK 复位为 1
    multiplier: u32,
    history: Vec<SentSeg>,
    bytes_sent: u64,
    // DCTCP alpha
    alpha: f64,
    g: f64,
}

impl RttEstimator {
    pub fn new(init_rtt: Time, min_rto: Time, max_rto: Time, g: f64) -> RttEstimator {
        RttEstimator {
            srtt: init_rtt,
            rttvar: init_rtt / 2,
            has_sample: false,
            init_rtt,
            min_rto,
            max_rto,
            multiplier: 1,
            history: Vec::new(),
            bytes_sent: 0,
            alpha: 0.0,
            g,
        }
    }

    pub fn srtt(&self) -> Time {
        self.srtt
    }

    /// 当前 DCTCP alpha ∈ [0, 1]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// 当前重传超时
    pub fn rto(&self) -> Time {
        let base = self.srtt + self.rttvar * 4;
        let backed = base * i64::from(self.multiplier);
        backed.max_of(self.min_rto).min_of(self.max_rto)
    }

    /// RTO 事件后翻倍退避
    pub fn increase_multiplier(&mut self) {
        self.multiplier = (self.multiplier * 2).min(64);
    }

    pub fn reset_multiplier(&mut self) {
        self.multiplier = 1;
    }

    /// 记录一次（重）发送。
    pub fn on_sent(&mut self, seq: u32, len: u32, now: Time, is_retransmit: bool) {
        if is_retransmit {
            for s in &mut self.history {
                if s.seq == seq {
                    s.retransmitted = true;
                    s.sent_at = now;
                    return;
                }
            }
        }
        self.history.push(SentSeg {
            seq,
            len,
            sent_at: now,
            retransmitted: is_retransmit,
        });
        self.bytes_sent += u64::from(len);
    }

    /// 累计确认到 `ack`：退休 history 条目、采样 RTT、更新 alpha。
    /// `ece` 是本条 ACK 是否携带 ECN 回显。
    pub fn on_ack(&mut self, ack: u32, now: Time, ece: bool) {
        let mut sample: Option<Time> = None;
        let mut retired_bytes: u64 = 0;
        self.history.retain(|s| {
            let end = s.seq.saturating_add(s.len);
            if end <= ack {
                retired_bytes += u64::from(s.len);
                if !s.retransmitted {
                    sample = Some(now - s.sent_at);
                }
                false
            } else {
                true
            }
        });

        if let Some(m) = sample {
            self.measure(m);
        }
        if retired_bytes > 0 {
            let marked = if ece { retired_bytes } else { 0 };
            let frac = marked as f64 / retired_bytes as f64;
            self.alpha = (1.0 - self.g) * self.alpha + self.g * frac;
            trace!(alpha = self.alpha, frac, retired_bytes, "alpha 更新");
        }
        self.reset_multiplier();
    }

    fn measure(&mut self, m: Time) {
        if !self.has_sample {
            self.srtt = m;
            self.rttvar = m / 2;
            self.has_sample = true;
            return;
        }
        // Jacobson/Karels: var = 3/4 var + 1/4 |srtt - m|; srtt = 7/8 srtt + 1/8 m
        let err = if m > self.srtt { m - self.srtt } else { self.srtt - m };
        self.rttvar = (self.rttvar * 3 + err) / 4;
        self.srtt = (self.srtt * 7 + m) / 8;
    }

    /// 丢弃全部在途记录（连接重置/RTO 回退时）。
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// 估计尚无样本时回落到初始 RTT。
    pub fn effective_rtt(&self) -> Time {
        if self.has_sample { self.srtt } else { self.init_rtt }
    }
}
