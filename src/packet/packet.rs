//! 数据包类型
//!
//! 逻辑字节序列 = [头部虚拟零字节][真实 arena 窗口][尾部虚拟零字节]。
//! clone 共享 uid 与 arena；copy 产生新 uid；所有写入是 copy-on-write。

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::buffer::Buffer;
use super::error::PacketError;
use super::header::{Header, Trailer};
use super::tag::{ByteTagList, PacketTagList, Tag};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn alloc_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

/// 网络数据包。
#[derive(Clone)]
pub struct Packet {
    uid: u64,
    buf: Buffer,
    head_virt: u32,
    tail_virt: u32,
    packet_tags: PacketTagList,
    byte_tags: ByteTagList,
}

impl Default for Packet {
    fn default() -> Self {
        Packet::new()
    }
}

impl Packet {
    /// 空包
    pub fn new() -> Packet {
        Packet {
            uid: alloc_uid(),
            buf: Buffer::new(),
            head_virt: 0,
            tail_virt: 0,
            packet_tags: PacketTagList::default(),
            byte_tags: ByteTagList::default(),
        }
    }

    /// 以 `n` 个虚拟零字节为载荷的包（不分配）。
    pub fn with_virtual_payload(n: u32) -> Packet {
        let mut p = Packet::new();
        p.add_padding_at_end(n);
        p
    }

    /// 以真实字节为载荷的包。
    pub fn from_bytes(bytes: &[u8]) -> Packet {
        Packet {
            uid: alloc_uid(),
            buf: Buffer::from_bytes(bytes),
            head_virt: 0,
            tail_virt: 0,
            packet_tags: PacketTagList::default(),
            byte_tags: ByteTagList::default(),
        }
    }

    /// 全局唯一 id；clone 共享，copy 重新分配。
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// 逻辑大小 = 虚拟 + 真实字节
    pub fn size(&self) -> u32 {
        self.head_virt + self.buf.len() as u32 + self.tail_virt
    }

    fn real_len(&self) -> u32 {
        self.buf.len() as u32
    }

    /// 深拷贝语义的复制：内容相同、uid 全新。
    pub fn copy(&self) -> Packet {
        let mut p = self.clone();
        p.uid = alloc_uid();
        p
    }

    // ---- 字节操作 ----

    /// 头部扩展 `n` 个真实零字节。已有虚拟头字节先物化。
    pub fn add_at_start(&mut self, n: u32) {
        self.materialize_head();
        self.buf.add_at_start(n as usize);
        self.byte_tags.shift_right(n);
    }

    /// 尾部扩展 `n` 个真实零字节。已有虚拟尾字节先物化。
    pub fn add_at_end(&mut self, n: u32) {
        self.materialize_tail();
        self.buf.add_at_end(n as usize);
    }

    /// 尾部追加 `n` 个虚拟零字节：只记数，不分配。
    pub fn add_padding_at_end(&mut self, n: u32) {
        self.tail_virt = self.tail_virt.saturating_add(n);
    }

    /// 头部移除 `n` 字节：先虚拟、后真实、再尾部虚拟。
    pub fn remove_at_start(&mut self, n: u32) -> Result<(), PacketError> {
        if n > self.size() {
            return Err(PacketError::Truncation {
                requested: n,
                available: self.size(),
            });
        }
        let mut left = n;
        let h = left.min(self.head_virt);
        self.head_virt -= h;
        left -= h;
        let r = left.min(self.real_len());
        self.buf.remove_at_start(r as usize);
        left -= r;
        self.tail_virt -= left;
        self.byte_tags.shift_left_and_clip(n, self.size());
        Ok(())
    }

    /// 尾部移除 `n` 字节：先尾部虚拟、后真实、再头部虚拟。
    pub fn remove_at_end(&mut self, n: u32) -> Result<(), PacketError> {
        if n > self.size() {
            return Err(PacketError::Truncation {
                requested: n,
                available: self.size(),
            });
        }
        let mut left = n;
        let t = left.min(self.tail_virt);
        self.tail_virt -= t;
        left -= t;
        let r = left.min(self.real_len());
        self.buf.remove_at_end(r as usize);
        left -= r;
        self.head_virt -= left;
        self.byte_tags.clip_to(self.size());
        Ok(())
    }

    /// 零拷贝分片：`[offset, offset+len)` 上的新视图，共享 arena 与 uid。
    /// 字节标签裁剪平移，packet 标签复制。
    pub fn create_fragment(&self, offset: u32, len: u32) -> Result<Packet, PacketError> {
        let end = offset.saturating_add(len);
        if end > self.size() {
            return Err(PacketError::Truncation {
                requested: end,
                available: self.size(),
            });
        }
        // 与三段区域（头虚拟/真实/尾虚拟）分别求交
        let real_lo = self.head_virt;
        let real_hi = self.head_virt + self.real_len();
        let seg = |lo: u32, hi: u32| -> u32 {
            let s = offset.max(lo);
            let t = end.min(hi);
            t.saturating_sub(s)
        };
        let new_head_virt = seg(0, real_lo);
        let real_cov = seg(real_lo, real_hi);
        let new_tail_virt = len - new_head_virt - real_cov;
        let real_off = offset.clamp(real_lo, real_hi) - real_lo;

        Ok(Packet {
            uid: self.uid,
            buf: self.buf.slice(real_off as usize, real_cov as usize),
            head_virt: new_head_virt,
            tail_virt: new_tail_virt,
            packet_tags: self.packet_tags.clone(),
            byte_tags: self.byte_tags.fragment(offset, len),
        })
    }

    /// 拼接：把 `other` 的字节接到本包末尾。右侧字节标签右移本包长度；
    /// 右侧 packet 标签不并入（以本包为准）。
    pub fn append(&mut self, other: &Packet) {
        let left_len = self.size();
        if other.real_len() == 0 {
            self.tail_virt = self
                .tail_virt
                .saturating_add(other.head_virt + other.tail_virt);
        } else {
            self.materialize_tail();
            if other.head_virt > 0 {
                self.buf.add_at_end(other.head_virt as usize);
            }
            self.buf.extend_from(&other.buf);
            self.tail_virt = other.tail_virt;
        }
        self.byte_tags.append_shifted(&other.byte_tags, left_len);
    }

    /// 逻辑字节读出：虚拟区域为 0。
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = vec![0u8; self.size() as usize];
        let lo = self.head_virt as usize;
        v[lo..lo + self.buf.len()].copy_from_slice(self.buf.as_slice());
        v
    }

    /// 逻辑字节的连续视图；无虚拟头字节时为零拷贝借用。
    fn contiguous(&self) -> Cow<'_, [u8]> {
        if self.head_virt == 0 && self.tail_virt == 0 {
            Cow::Borrowed(self.buf.as_slice())
        } else {
            Cow::Owned(self.to_bytes())
        }
    }

    fn materialize_head(&mut self) {
        if self.head_virt > 0 {
            self.buf.add_at_start(self.head_virt as usize);
            self.head_virt = 0;
        }
    }

    fn materialize_tail(&mut self) {
        if self.tail_virt > 0 {
            self.buf.add_at_end(self.tail_virt as usize);
            self.tail_virt = 0;
        }
    }

    // ---- 头部链 ----

    /// 前置一个头部（序列化到头部新增的真实字节上）。
    pub fn add_header<H: Header>(&mut self, h: &H) {
        let n = h.serialized_size();
        self.add_at_start(n as u32);
        h.serialize(&mut self.buf.make_mut()[..n]);
    }

    /// 读取头部但不剥离。
    pub fn peek_header<H: Header>(&self) -> Result<H, PacketError> {
        let bytes = self.contiguous();
        let (h, _) = H::deserialize(&bytes)?;
        Ok(h)
    }

    /// 读取并剥离头部。
    pub fn remove_header<H: Header>(&mut self) -> Result<H, PacketError> {
        let (h, used) = {
            let bytes = self.contiguous();
            H::deserialize(&bytes)?
        };
        self.remove_at_start(used as u32)?;
        Ok(h)
    }

    /// 末端追加一个尾部。
    pub fn add_trailer<T: Trailer>(&mut self, t: &T) {
        let n = t.serialized_size();
        self.add_at_end(n as u32);
        let buf = self.buf.make_mut();
        let len = buf.len();
        t.serialize(&mut buf[len - n..]);
    }

    /// 读取尾部但不剥离。
    pub fn peek_trailer<T: Trailer>(&self) -> Result<T, PacketError> {
        let bytes = self.contiguous();
        let (t, _) = T::deserialize(&bytes)?;
        Ok(t)
    }

    /// 读取并剥离尾部。
    pub fn remove_trailer<T: Trailer>(&mut self) -> Result<T, PacketError> {
        let (t, used) = {
            let bytes = self.contiguous();
            T::deserialize(&bytes)?
        };
        self.remove_at_end(used as u32)?;
        Ok(t)
    }

    // ---- 标签 ----

    pub fn add_packet_tag<T: Tag>(&mut self, tag: T) -> Result<(), PacketError> {
        self.packet_tags.add(tag)
    }

    pub fn replace_packet_tag<T: Tag>(&mut self, tag: T) {
        self.packet_tags.replace(tag)
    }

    pub fn remove_packet_tag<T: Tag>(&mut self) -> bool {
        self.packet_tags.remove::<T>()
    }

    pub fn peek_packet_tag<T: Tag + Clone>(&self) -> Option<T> {
        self.packet_tags.peek::<T>()
    }

    /// 给整个当前字节视图打字节标签。
    pub fn add_byte_tag<T: Tag>(&mut self, tag: T) {
        self.byte_tags.add(tag, 0, self.size());
    }

    /// 给 `[start, end)` 打字节标签。
    pub fn add_byte_tag_range<T: Tag>(&mut self, tag: T, start: u32, end: u32) {
        self.byte_tags.add(tag, start, end.min(self.size()));
    }

    pub fn byte_tags(&self) -> &ByteTagList {
        &self.byte_tags
    }

    pub fn packet_tags(&self) -> &PacketTagList {
        &self.packet_tags
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("uid", &self.uid)
            .field("size", &self.size())
            .field("real", &self.buf.len())
            .field("head_virt", &self.head_virt)
            .field("tail_virt", &self.tail_virt)
            .field("packet_tags", &self.packet_tags.len())
            .field("byte_tags", &self.byte_tags.len())
            .finish()
    }
}
