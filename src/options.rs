//! 保存参数
//!
//! 保存时调用方传入一个标志字，其中版本位和压缩级别位各必须恰好设置一个。
//! 位定义固定，可以直接与外部绑定层的整数标志互换。

use std::fmt;

use crate::compression::DEFAULT_LEVEL;
use crate::datatypes::ArchiveVersion;
use crate::utils::BsaError;

bitflags::bitflags! {
    /// 保存标志字（版本位 + 压缩级别位）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SaveFlags: u32 {
        const VERSION_TES3 = 0x0001;
        const VERSION_TES4 = 0x0002;
        const VERSION_TES5 = 0x0004;

        const COMPRESS_LEVEL_0 = 0x0010;
        const COMPRESS_LEVEL_1 = 0x0020;
        const COMPRESS_LEVEL_2 = 0x0040;
        const COMPRESS_LEVEL_3 = 0x0080;
        const COMPRESS_LEVEL_4 = 0x0100;
        const COMPRESS_LEVEL_5 = 0x0200;
        const COMPRESS_LEVEL_6 = 0x0400;
        const COMPRESS_LEVEL_7 = 0x0800;
        const COMPRESS_LEVEL_8 = 0x1000;
        const COMPRESS_LEVEL_9 = 0x2000;
        /// 保持每个文件原有的压缩状态
        const COMPRESS_LEVEL_NOCHANGE = 0x4000;

        const VERSION_MASK = Self::VERSION_TES3.bits()
            | Self::VERSION_TES4.bits()
            | Self::VERSION_TES5.bits();
        const COMPRESS_MASK = 0x7FF0;
    }
}

impl SaveFlags {
    /// 指定版本的标志位
    pub fn for_version(version: ArchiveVersion) -> SaveFlags {
        match version {
            ArchiveVersion::Tes3 => SaveFlags::VERSION_TES3,
            ArchiveVersion::Tes4 => SaveFlags::VERSION_TES4,
            ArchiveVersion::Tes5 => SaveFlags::VERSION_TES5,
        }
    }

    /// 指定压缩级别（0-9）的标志位
    pub fn compress_level(level: u32) -> Option<SaveFlags> {
        if level > 9 {
            return None;
        }
        SaveFlags::from_bits(SaveFlags::COMPRESS_LEVEL_0.bits() << level)
    }
}

/// 压缩策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// 所有文件不压缩（级别 0）
    None,
    /// 所有文件以指定级别（1-9）压缩
    Level(u32),
    /// 每个文件保持原有的压缩状态
    NoChange,
}

impl Compression {
    /// 需要重新编码时使用的 zlib 级别
    pub fn zlib_level(&self) -> u32 {
        match self {
            Compression::Level(level) => *level,
            Compression::None | Compression::NoChange => DEFAULT_LEVEL,
        }
    }
}

/// 校验过的保存参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SaveOptions {
    pub version: ArchiveVersion,
    pub compression: Compression,
}

impl SaveOptions {
    pub fn new(version: ArchiveVersion, compression: Compression) -> Result<Self, BsaError> {
        let options = SaveOptions { version, compression };
        options.flags()?;
        Ok(options)
    }

    /// 从原始标志字解析并校验
    ///
    /// 未知位、多个版本位、多个压缩位、缺少任一类位都视为参数错误；
    /// Morrowind 格式不允许压缩，只能搭配 `COMPRESS_LEVEL_0`。
    pub fn from_bits(bits: u32) -> Result<Self, BsaError> {
        let flags = SaveFlags::from_bits(bits)
            .ok_or_else(|| BsaError::invalid(format!("unknown save flag bits: {:#06x}", bits)))?;

        let version = match flags & SaveFlags::VERSION_MASK {
            f if f == SaveFlags::VERSION_TES3 => ArchiveVersion::Tes3,
            f if f == SaveFlags::VERSION_TES4 => ArchiveVersion::Tes4,
            f if f == SaveFlags::VERSION_TES5 => ArchiveVersion::Tes5,
            f if f.is_empty() => return Err(BsaError::invalid("no version flag given")),
            _ => return Err(BsaError::invalid("more than one version flag given")),
        };

        let compress_bits = (flags & SaveFlags::COMPRESS_MASK).bits();
        if compress_bits == 0 {
            return Err(BsaError::invalid("no compression flag given"));
        }
        if compress_bits.count_ones() != 1 {
            return Err(BsaError::invalid("more than one compression flag given"));
        }

        let compression = match compress_bits.trailing_zeros() - 4 {
            0 => Compression::None,
            10 => Compression::NoChange,
            level => Compression::Level(level),
        };

        if !version.supports_compression() && compression != Compression::None {
            return Err(BsaError::invalid("Morrowind BSAs cannot be compressed"));
        }

        Ok(SaveOptions { version, compression })
    }

    /// 转换回标志字
    pub fn flags(&self) -> Result<SaveFlags, BsaError> {
        let compression = match self.compression {
            Compression::None => SaveFlags::COMPRESS_LEVEL_0,
            Compression::NoChange => SaveFlags::COMPRESS_LEVEL_NOCHANGE,
            Compression::Level(level) if (1..=9).contains(&level) => {
                SaveFlags::compress_level(level)
                    .ok_or_else(|| BsaError::invalid(format!("invalid compression level {}", level)))?
            }
            Compression::Level(level) => {
                return Err(BsaError::invalid(format!("invalid compression level {}", level)))
            }
        };

        if !self.version.supports_compression() && self.compression != Compression::None {
            return Err(BsaError::invalid("Morrowind BSAs cannot be compressed"));
        }

        Ok(SaveFlags::for_version(self.version) | compression)
    }
}

impl fmt::Display for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compression {
            Compression::None => write!(f, "{}, uncompressed", self.version),
            Compression::Level(level) => write!(f, "{}, zlib level {}", self.version, level),
            Compression::NoChange => write!(f, "{}, compression unchanged", self.version),
        }
    }
}
