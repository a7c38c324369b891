//! 头部/尾部 trait
//!
//! 每种头部声明自身序列化大小并可在字节切片上读写。
//! 头部从 packet 前端以 LIFO 顺序进出；尾部在末端对称。

use std::fmt;

use super::error::PacketError;

/// 可序列化头部。
pub trait Header: Sized + fmt::Display {
    /// 序列化后的字节数
    fn serialized_size(&self) -> usize;

    /// 写入 `buf[..serialized_size()]`；调用方保证空间充足。
    fn serialize(&self, buf: &mut [u8]);

    /// 从切片前端解析；返回头部与消耗的字节数。
    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError>;
}

/// 可序列化尾部：在 packet 末端读写。
pub trait Trailer: Sized + fmt::Display {
    fn serialized_size(&self) -> usize;

    /// 写入 `buf` 的最后 `serialized_size()` 个字节。
    fn serialize(&self, buf: &mut [u8]);

    /// 从切片末端解析；返回尾部与消耗的字节数。
    fn deserialize(buf: &[u8]) -> Result<(Self, usize), PacketError>;
}

/// 大端读取辅助（头部实现共用）。
pub(crate) fn need(buf: &[u8], n: usize) -> Result<(), PacketError> {
    if buf.len() < n {
        return Err(PacketError::Truncation {
            requested: n as u32,
            available: buf.len() as u32,
        });
    }
    Ok(())
}

pub(crate) fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
}

pub(crate) fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

pub(crate) fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(b)
}

pub(crate) fn put_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_be_bytes());
}
