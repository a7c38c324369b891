//! pcap 读写
//!
//! 标准 pcap 布局：全局头 + 逐包记录。快照长度与链路类型可配置；
//! 读取端按 magic 自动识别字节序相反的文件。

use std::io::{Read, Write};

use thiserror::Error;

pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
pub const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;
pub const LINKTYPE_ETHERNET: u32 = 1;

/// pcap 文件错误
#[derive(Debug, Error)]
pub enum PcapError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad pcap magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("truncated pcap record")]
    Truncated,
}

/// 一条抓包记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcapRecord {
    pub ts_sec: u32,
    pub ts_usec: u32,
    /// 原始帧长（可能大于快照后的 data 长度）
    pub orig_len: u32,
    pub data: Vec<u8>,
}

/// pcap 写入器
#[derive(Debug)]
pub struct PcapWriter<W: Write> {
    out: W,
    snap_len: u32,
    /// 以交换字节序写出（生成异端序文件）
    swapped: bool,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(out: W, snap_len: u32, link_type: u32) -> Result<PcapWriter<W>, PcapError> {
        Self::with_endianness(out, snap_len, link_type, false)
    }

    pub fn with_endianness(
        mut out: W,
        snap_len: u32,
        link_type: u32,
        swapped: bool,
    ) -> Result<PcapWriter<W>, PcapError> {
        let w32 = |v: u32| if swapped { v.swap_bytes() } else { v }.to_le_bytes();
        let w16 = |v: u16| if swapped { v.swap_bytes() } else { v }.to_le_bytes();
        out.write_all(&w32(PCAP_MAGIC))?;
        out.write_all(&w16(2))?; // version major
        out.write_all(&w16(4))?; // version minor
        out.write_all(&w32(0))?; // thiszone
        out.write_all(&w32(0))?; // sigfigs
        out.write_all(&w32(snap_len))?;
        out.write_all(&w32(link_type))?;
        Ok(PcapWriter {
            out,
            snap_len,
            swapped,
        })
    }

    fn put_u32(&mut self, v: u32) -> Result<(), PcapError> {
        let v = if self.swapped { v.swap_bytes() } else { v };
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    /// 写一条记录；数据按快照长度截断。
    pub fn write_record(&mut self, rec: &PcapRecord) -> Result<(), PcapError> {
        let incl = (rec.data.len() as u32).min(self.snap_len);
        self.put_u32(rec.ts_sec)?;
        self.put_u32(rec.ts_usec)?;
        self.put_u32(incl)?;
        self.put_u32(rec.orig_len)?;
        self.out.write_all(&rec.data[..incl as usize])?;
        Ok(())
    }

    /// 便捷：以纳秒时间戳写一帧。
    pub fn write_frame(&mut self, t_ns: u64, frame: &[u8]) -> Result<(), PcapError> {
        self.write_record(&PcapRecord {
            ts_sec: (t_ns / 1_000_000_000) as u32,
            ts_usec: ((t_ns % 1_000_000_000) / 1_000) as u32,
            orig_len: frame.len() as u32,
            data: frame.to_vec(),
        })
    }
}

/// pcap 读取器
#[derive(Debug)]
pub struct PcapReader<R: Read> {
    input: R,
    swapped: bool,
    pub snap_len: u32,
    pub link_type: u32,
}

impl<R: Read> PcapReader<R> {
    pub fn new(mut input: R) -> Result<PcapReader<R>, PcapError> {
        let mut head = [0u8; 24];
        input.read_exact(&mut head)?;
        let raw_magic = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let swapped = match raw_magic {
            PCAP_MAGIC => false,
            PCAP_MAGIC_SWAPPED => true,
            other => return Err(PcapError::BadMagic(other)),
        };
        let get = |b: &[u8], at: usize| -> u32 {
            let v = u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]);
            if swapped { v.swap_bytes() } else { v }
        };
        Ok(PcapReader {
            input,
            swapped,
            snap_len: get(&head, 16),
            link_type: get(&head, 20),
        })
    }

    pub fn is_swapped(&self) -> bool {
        self.swapped
    }

    /// 读取下一条记录；文件尾返回 None。
    pub fn read_record(&mut self) -> Result<Option<PcapRecord>, PcapError> {
        let mut head = [0u8; 16];
        match self.input.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let get = |b: &[u8], at: usize| -> u32 {
            let v = u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]]);
            if self.swapped { v.swap_bytes() } else { v }
        };
        let incl = get(&head, 8);
        let mut data = vec![0u8; incl as usize];
        self.input
            .read_exact(&mut data)
            .map_err(|_| PcapError::Truncated)?;
        Ok(Some(PcapRecord {
            ts_sec: get(&head, 0),
            ts_usec: get(&head, 4),
            orig_len: get(&head, 12),
            data,
        }))
    }

    /// 读完整个文件。
    pub fn read_all(&mut self) -> Result<Vec<PcapRecord>, PcapError> {
        let mut out = Vec::new();
        while let Some(rec) = self.read_record()? {
            out.push(rec);
        }
        Ok(out)
    }
}
