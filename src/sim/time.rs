//! 仿真时间类型
//!
//! 有符号 64 位计数，单位由全局精度决定（默认纳秒）。
//! 精度一旦被任何 `Time` 观察过即冻结，之后修改属于配置错误。

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use super::error::SimError;

/// 时间单位（全局精度的候选集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeUnit {
    S,
    Ms,
    Us,
    Ns,
    Ps,
    Fs,
}

impl TimeUnit {
    /// 以飞秒为基准的 10 的幂次
    fn exp_fs(self) -> u32 {
        match self {
            TimeUnit::S => 15,
            TimeUnit::Ms => 12,
            TimeUnit::Us => 9,
            TimeUnit::Ns => 6,
            TimeUnit::Ps => 3,
            TimeUnit::Fs => 0,
        }
    }

    fn from_u8(v: u8) -> TimeUnit {
        match v {
            0 => TimeUnit::S,
            1 => TimeUnit::Ms,
            2 => TimeUnit::Us,
            3 => TimeUnit::Ns,
            4 => TimeUnit::Ps,
            _ => TimeUnit::Fs,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TimeUnit::S => 0,
            TimeUnit::Ms => 1,
            TimeUnit::Us => 2,
            TimeUnit::Ns => 3,
            TimeUnit::Ps => 4,
            TimeUnit::Fs => 5,
        }
    }
}

// 全局精度：默认 ns；FROZEN 在首次观察后置位。
static RESOLUTION: AtomicU8 = AtomicU8::new(3);
static FROZEN: AtomicBool = AtomicBool::new(false);

/// 读取全局精度（读取即冻结）。
pub fn time_resolution() -> TimeUnit {
    FROZEN.store(true, Ordering::SeqCst);
    TimeUnit::from_u8(RESOLUTION.load(Ordering::SeqCst))
}

/// 设置全局精度；精度冻结后返回 `ResolutionFrozen`。
pub fn set_resolution(unit: TimeUnit) -> Result<(), SimError> {
    if FROZEN.load(Ordering::SeqCst) {
        return Err(SimError::ResolutionFrozen);
    }
    RESOLUTION.store(unit.as_u8(), Ordering::SeqCst);
    Ok(())
}

/// 仿真时间：全局精度下的有符号计数。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Hash,
)]
pub struct Time(pub i64);

impl Time {
    pub const ZERO: Time = Time(0);
    pub const MIN: Time = Time(i64::MIN);
    pub const MAX: Time = Time(i64::MAX);

    /// 以指定单位构造；向全局精度转换，粗到细放大、细到粗截断。
    pub fn from_unit(count: i64, unit: TimeUnit) -> Time {
        let res = time_resolution();
        Time(convert(count, unit, res))
    }

    /// 同 `from_unit`，但在细到粗且丢失精度时返回 `ResolutionConflict`。
    pub fn try_from_unit(count: i64, unit: TimeUnit) -> Result<Time, SimError> {
        let res = time_resolution();
        if unit.exp_fs() < res.exp_fs() {
            let div = pow10(res.exp_fs() - unit.exp_fs());
            if count % div != 0 {
                return Err(SimError::ResolutionConflict {
                    count,
                    from: unit,
                    to: res,
                });
            }
        }
        Ok(Time(convert(count, unit, res)))
    }

    /// 从浮点秒构造（四舍五入到全局精度）。
    pub fn seconds(s: f64) -> Time {
        let res = time_resolution();
        let scale = pow10(TimeUnit::S.exp_fs() - res.exp_fs()) as f64;
        Time((s * scale).round() as i64)
    }

    pub fn from_secs(s: i64) -> Time {
        Time::from_unit(s, TimeUnit::S)
    }

    pub fn from_millis(ms: i64) -> Time {
        Time::from_unit(ms, TimeUnit::Ms)
    }

    pub fn from_micros(us: i64) -> Time {
        Time::from_unit(us, TimeUnit::Us)
    }

    pub fn from_nanos(ns: i64) -> Time {
        Time::from_unit(ns, TimeUnit::Ns)
    }

    /// 以指定单位读出（细到粗截断）。
    pub fn to_unit(self, unit: TimeUnit) -> i64 {
        let res = time_resolution();
        convert(self.0, res, unit)
    }

    pub fn as_secs_f64(self) -> f64 {
        let res = time_resolution();
        let scale = pow10(TimeUnit::S.exp_fs() - res.exp_fs()) as f64;
        self.0 as f64 / scale
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn saturating_add(self, rhs: Time) -> Time {
        Time(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Time) -> Time {
        Time(self.0.saturating_sub(rhs.0))
    }

    pub fn min_of(self, other: Time) -> Time {
        Time(self.0.min(other.0))
    }

    pub fn max_of(self, other: Time) -> Time {
        Time(self.0.max(other.0))
    }
}

fn pow10(exp: u32) -> i64 {
    10_i64.saturating_pow(exp)
}

/// 单位换算（饱和乘法、截断除法）
fn convert(count: i64, from: TimeUnit, to: TimeUnit) -> i64 {
    let ef = from.exp_fs();
    let et = to.exp_fs();
    if ef >= et {
        count.saturating_mul(pow10(ef - et))
    } else {
        count / pow10(et - ef)
    }
}

impl std::ops::Add for Time {
    type Output = Time;
    fn add(self, rhs: Time) -> Time {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub for Time {
    type Output = Time;
    fn sub(self, rhs: Time) -> Time {
        self.saturating_sub(rhs)
    }
}

impl std::ops::Mul<i64> for Time {
    type Output = Time;
    fn mul(self, rhs: i64) -> Time {
        Time(self.0.saturating_mul(rhs))
    }
}

impl std::ops::Div<i64> for Time {
    type Output = Time;
    fn div(self, rhs: i64) -> Time {
        Time(self.0 / rhs)
    }
}

impl std::ops::Div<Time> for Time {
    type Output = i64;
    fn div(self, rhs: Time) -> i64 {
        self.0 / rhs.0
    }
}

impl std::ops::Neg for Time {
    type Output = Time;
    fn neg(self) -> Time {
        Time(self.0.saturating_neg())
    }
}
