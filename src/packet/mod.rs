//! 数据包模块
//!
//! 写时复制的字节缓冲、虚拟零字节、头/尾部链与两类元数据标签。

// 子模块声明
mod buffer;
mod error;
mod header;
mod packet;
mod tag;

// 重新导出公共接口
pub use buffer::Buffer;
pub use error::PacketError;
pub use header::{Header, Trailer};
pub(crate) use header::{get_u16, get_u32, get_u64, need, put_u16, put_u32, put_u64};
pub use packet::Packet;
pub use tag::{ByteTagList, PacketTagList, Tag};
