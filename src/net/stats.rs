//! 运行统计

use serde::Serialize;

/// 全网计数器；仿真结束后可直接序列化导出。
#[derive(Debug, Default, Clone, Serialize)]
pub struct NetStats {
    /// 链路上完成投递的帧数
    pub delivered: u64,
    /// 损耗注入丢弃的帧数
    pub lost: u64,
    /// MMU 准入拒绝的丢弃
    pub admission_drops: u64,
    /// 打上 CE 标记的帧数
    pub ecn_marked: u64,
    pub pfc_pauses: u64,
    pub pfc_resumes: u64,
    /// 目的 IP 无法解析
    pub no_route: u64,
}
