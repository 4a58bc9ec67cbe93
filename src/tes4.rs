//! Oblivion / Skyrim / Fallout 3 / New Vegas 哈希格式
//!
//! ```text
//! header        36 字节
//! folders       folder_count × { hash u64, count u32, offset u32 }
//! file blocks   每个目录：bzstring 目录名 + count × { hash u64, size u32, offset u32 }
//! file names    NUL 结尾的文件名，顺序与文件记录一致
//! data          数据块（可选 u32 原始大小 + zlib 数据流）
//! ```
//!
//! 目录和文件记录都按哈希升序排列。单文件 size 字段的 0x40000000 位
//! 反转归档的默认压缩状态。

pub mod parser;
pub mod writer;

use std::io::{Cursor, Write};

use crate::datatypes::{
    read_u32, read_u64, truncated, write_u32, write_u64, ArchiveFlags, ArchiveVersion, FileFlags,
    BSA_MAGIC,
};
use crate::utils::BsaError;

pub use parser::parse;
pub use writer::{write, WriteParams};

/// 头部长度，也是目录记录表的起点
pub const HEADER_SIZE: u32 = 36;
/// 目录记录长度
pub const FOLDER_RECORD_SIZE: u32 = 16;
/// 文件记录长度
pub const FILE_RECORD_SIZE: u32 = 16;

/// 哈希格式头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tes4Header {
    pub version: ArchiveVersion,
    /// 目录记录表的偏移（总是 36）
    pub offset: u32,
    pub archive_flags: ArchiveFlags,
    pub folder_count: u32,
    pub file_count: u32,
    /// 所有目录名长度之和（含 NUL，不含长度前缀）
    pub total_folder_name_length: u32,
    /// 所有文件名长度之和（含 NUL）
    pub total_file_name_length: u32,
    pub file_flags: FileFlags,
}

impl Tes4Header {
    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, BsaError> {
        let magic = read_u32(cursor).map_err(truncated("header"))?;
        if magic != BSA_MAGIC {
            return Err(BsaError::parse(format!("not a BSA archive (magic {:#010x})", magic)));
        }

        let raw_version = read_u32(cursor).map_err(truncated("header"))?;
        let version = ArchiveVersion::from_header_version(raw_version)
            .ok_or_else(|| BsaError::parse(format!("unsupported BSA version {}", raw_version)))?;

        Ok(Tes4Header {
            version,
            offset: read_u32(cursor).map_err(truncated("header"))?,
            archive_flags: ArchiveFlags::from_bits_retain(read_u32(cursor).map_err(truncated("header"))?),
            folder_count: read_u32(cursor).map_err(truncated("header"))?,
            file_count: read_u32(cursor).map_err(truncated("header"))?,
            total_folder_name_length: read_u32(cursor).map_err(truncated("header"))?,
            total_file_name_length: read_u32(cursor).map_err(truncated("header"))?,
            file_flags: FileFlags::from_bits_retain(read_u32(cursor).map_err(truncated("header"))?),
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), BsaError> {
        let version = self
            .version
            .header_version()
            .ok_or_else(|| BsaError::invalid("Morrowind archives have no hashed header"))?;

        write_u32(writer, BSA_MAGIC)?;
        write_u32(writer, version)?;
        write_u32(writer, self.offset)?;
        write_u32(writer, self.archive_flags.bits())?;
        write_u32(writer, self.folder_count)?;
        write_u32(writer, self.file_count)?;
        write_u32(writer, self.total_folder_name_length)?;
        write_u32(writer, self.total_file_name_length)?;
        write_u32(writer, self.file_flags.bits())?;
        Ok(())
    }

    /// 默认压缩状态
    pub fn compressed_by_default(&self) -> bool {
        self.archive_flags.contains(ArchiveFlags::COMPRESSED)
    }

    /// 数据块前是否嵌入完整路径
    pub fn embeds_names(&self) -> bool {
        embeds_names(self.version, self.archive_flags)
    }
}

/// 嵌入文件名标志只在 104 版本中有效
pub fn embeds_names(version: ArchiveVersion, flags: ArchiveFlags) -> bool {
    version == ArchiveVersion::Tes5 && flags.contains(ArchiveFlags::EMBED_FILE_NAMES)
}

/// 目录记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderRecord {
    pub hash: u64,
    pub count: u32,
    /// 目录名位置 + total_file_name_length
    pub offset: u32,
}

impl FolderRecord {
    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, BsaError> {
        Ok(FolderRecord {
            hash: read_u64(cursor).map_err(truncated("folder record"))?,
            count: read_u32(cursor).map_err(truncated("folder record"))?,
            offset: read_u32(cursor).map_err(truncated("folder record"))?,
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), BsaError> {
        write_u64(writer, self.hash)?;
        write_u32(writer, self.count)?;
        write_u32(writer, self.offset)?;
        Ok(())
    }
}

/// 文件记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecord {
    pub hash: u64,
    /// 数据长度，高两位是标志位
    pub size: u32,
    /// 数据块的绝对偏移
    pub offset: u32,
}

impl FileRecord {
    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, BsaError> {
        Ok(FileRecord {
            hash: read_u64(cursor).map_err(truncated("file record"))?,
            size: read_u32(cursor).map_err(truncated("file record"))?,
            offset: read_u32(cursor).map_err(truncated("file record"))?,
        })
    }

    pub fn write(&self, writer: &mut dyn Write) -> Result<(), BsaError> {
        write_u64(writer, self.hash)?;
        write_u32(writer, self.size)?;
        write_u32(writer, self.offset)?;
        Ok(())
    }
}
