//! 数据包错误类型

use thiserror::Error;

/// 数据包操作错误。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// 请求移除/读取的字节数超过当前大小
    #[error("packet truncation: requested {requested} bytes, only {available} present")]
    Truncation { requested: u32, available: u32 },

    /// 同类型 packet tag 已存在
    #[error("duplicate packet tag: {type_name}")]
    DuplicateTag { type_name: &'static str },

    /// 反序列化遇到非法字段
    #[error("malformed header: {what}")]
    Malformed { what: &'static str },
}
