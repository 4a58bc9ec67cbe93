//! Morrowind 扁平格式
//!
//! ```text
//! header      magic(0x100) · hash_offset · file_count
//! records     file_count × { size, offset }      offset 相对数据区起点
//! name index  file_count × name_offset           相对名称块起点
//! names       NUL 结尾的文件名，`\` 分隔
//! hashes      file_count × { low, high }
//! data        12 + hash_offset + 8 · file_count 开始
//! ```
//!
//! 没有目录层级，也不支持压缩。

pub mod parser;
pub mod writer;

use std::io::{Cursor, Write};

use crate::datatypes::{read_u32, truncated, write_u32, TES3_MAGIC};
use crate::utils::BsaError;

pub use parser::parse;
pub use writer::write;

/// 头部长度
pub const HEADER_SIZE: u64 = 12;
/// 每个文件的 size/offset 记录长度
pub const RECORD_SIZE: u64 = 8;
/// 每个文件的名称偏移长度
pub const NAME_OFFSET_SIZE: u64 = 4;
/// 每个文件的哈希长度
pub const HASH_SIZE: u64 = 8;

/// 扁平格式头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tes3Header {
    /// 哈希表相对头部末尾的偏移
    pub hash_offset: u32,
    pub file_count: u32,
}

impl Tes3Header {
    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, BsaError> {
        let magic = read_u32(cursor).map_err(truncated("header"))?;
        if magic != TES3_MAGIC {
            return Err(BsaError::parse(format!("not a Morrowind BSA (magic {:#010x})", magic)));
        }

        Ok(Tes3Header {
            hash_offset: read_u32(cursor).map_err(truncated("header"))?,
            file_count: read_u32(cursor).map_err(truncated("header"))?,
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), BsaError> {
        write_u32(writer, TES3_MAGIC)?;
        write_u32(writer, self.hash_offset)?;
        write_u32(writer, self.file_count)?;
        Ok(())
    }

    /// 名称块起点
    pub fn names_start(&self) -> u64 {
        HEADER_SIZE + (RECORD_SIZE + NAME_OFFSET_SIZE) * u64::from(self.file_count)
    }

    /// 哈希表起点
    pub fn hashes_start(&self) -> u64 {
        HEADER_SIZE + u64::from(self.hash_offset)
    }

    /// 数据区起点
    pub fn data_start(&self) -> u64 {
        self.hashes_start() + HASH_SIZE * u64::from(self.file_count)
    }
}
