//! 网络对象句柄
//!
//! 节点与链路都以索引句柄引用，避免拓扑对象之间的循环引用。

use serde::{Deserialize, Serialize};

/// 节点句柄（主机或交换机）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// 链路句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub usize);

/// 节点本地端口号（在 `Network::ports` 中的下标）
pub type PortNo = usize;
