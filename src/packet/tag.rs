//! 标签列表
//!
//! 两类互相独立的元数据：packet 级标签（每类型最多一个，随分片/拼接原样传播）
//! 与字节区间标签（`[start, end)` 半开区间，随字节操作平移并裁剪）。

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::error::PacketError;

/// 可作为标签的类型：不可变、可共享。
pub trait Tag: Any + Send + Sync + fmt::Debug {}

impl<T: Any + Send + Sync + fmt::Debug> Tag for T {}

/// packet 级标签集合：按类型至多一个条目。
#[derive(Clone, Default)]
pub struct PacketTagList {
    entries: Vec<(TypeId, Arc<dyn Any + Send + Sync>)>,
}

impl PacketTagList {
    /// 添加标签；同类型已存在则报 `DuplicateTag`。
    pub fn add<T: Tag>(&mut self, tag: T) -> Result<(), PacketError> {
        let key = TypeId::of::<T>();
        if self.entries.iter().any(|(k, _)| *k == key) {
            return Err(PacketError::DuplicateTag {
                type_name: std::any::type_name::<T>(),
            });
        }
        self.entries.push((key, Arc::new(tag)));
        Ok(())
    }

    /// 覆盖式添加。
    pub fn replace<T: Tag>(&mut self, tag: T) {
        let key = TypeId::of::<T>();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, Arc::new(tag)));
    }

    /// 删除指定类型的标签；返回是否存在。
    pub fn remove<T: Tag>(&mut self) -> bool {
        let key = TypeId::of::<T>();
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.len() != before
    }

    /// 读取指定类型的标签副本。
    pub fn peek<T: Tag + Clone>(&self) -> Option<T> {
        let key = TypeId::of::<T>();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.downcast_ref::<T>().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PacketTagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketTagList")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[derive(Clone)]
struct ByteTagEntry {
    key: TypeId,
    start: u32,
    end: u32,
    data: Arc<dyn Any + Send + Sync>,
}

/// 字节区间标签集合。
#[derive(Clone, Default)]
pub struct ByteTagList {
    entries: Vec<ByteTagEntry>,
}

impl ByteTagList {
    /// 给 `[start, end)` 区间打标签；空区间直接忽略。
    pub fn add<T: Tag>(&mut self, tag: T, start: u32, end: u32) {
        if start >= end {
            return;
        }
        self.entries.push(ByteTagEntry {
            key: TypeId::of::<T>(),
            start,
            end,
            data: Arc::new(tag),
        });
    }

    /// 遍历指定类型的标签：`(start, end, tag)`。
    pub fn iter<T: Tag + Clone>(&self) -> impl Iterator<Item = (u32, u32, T)> + '_ {
        let key = TypeId::of::<T>();
        self.entries.iter().filter_map(move |e| {
            if e.key != key {
                return None;
            }
            e.data.downcast_ref::<T>().map(|t| (e.start, e.end, t.clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 头部插入 `n` 字节：所有区间右移。
    pub fn shift_right(&mut self, n: u32) {
        for e in &mut self.entries {
            e.start = e.start.saturating_add(n);
            e.end = e.end.saturating_add(n);
        }
    }

    /// 头部移除 `n` 字节：区间左移并裁剪到 `[0, size)`；变空者丢弃。
    pub fn shift_left_and_clip(&mut self, n: u32, size: u32) {
        for e in &mut self.entries {
            e.start = e.start.saturating_sub(n);
            e.end = e.end.saturating_sub(n);
            e.end = e.end.min(size);
            e.start = e.start.min(e.end);
        }
        self.entries.retain(|e| e.start < e.end);
    }

    /// 尾部收缩到 `size`：超出部分裁剪。
    pub fn clip_to(&mut self, size: u32) {
        for e in &mut self.entries {
            e.end = e.end.min(size);
            e.start = e.start.min(e.end);
        }
        self.entries.retain(|e| e.start < e.end);
    }

    /// 分片 `[offset, offset+len)`：裁剪两端并平移到新坐标。
    pub fn fragment(&self, offset: u32, len: u32) -> ByteTagList {
        let lo = offset;
        let hi = offset.saturating_add(len);
        let entries = self
            .entries
            .iter()
            .filter_map(|e| {
                let s = e.start.max(lo);
                let t = e.end.min(hi);
                if s >= t {
                    return None;
                }
                Some(ByteTagEntry {
                    key: e.key,
                    start: s - lo,
                    end: t - lo,
                    data: Arc::clone(&e.data),
                })
            })
            .collect();
        ByteTagList { entries }
    }

    /// 拼接：把 `other` 的区间整体右移 `left_len` 后并入。
    pub fn append_shifted(&mut self, other: &ByteTagList, left_len: u32) {
        for e in &other.entries {
            self.entries.push(ByteTagEntry {
                key: e.key,
                start: e.start.saturating_add(left_len),
                end: e.end.saturating_add(left_len),
                data: Arc::clone(&e.data),
            });
        }
    }
}

impl fmt::Debug for ByteTagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteTagList")
            .field("entries", &self.entries.len())
            .finish()
    }
}
