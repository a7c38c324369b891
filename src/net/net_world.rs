//! 网络世界
//!
//! `World` 的网络实现：事件通过向下转型取得 `Network` 并驱动它。

use std::any::Any;

use crate::sim::World;

use super::network::Network;

/// 包装 `Network` 的仿真世界。
#[derive(Debug)]
pub struct NetWorld {
    pub net: Network,
}

impl NetWorld {
    pub fn new(net: Network) -> NetWorld {
        NetWorld { net }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
