use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use encoding_rs::WINDOWS_1252;

use crate::utils::BsaError;

// 基础整数类型读取函数
pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, std::io::Error> {
    cursor.read_u8()
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, std::io::Error> {
    cursor.read_u32::<LittleEndian>()
}

pub fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, std::io::Error> {
    cursor.read_u64::<LittleEndian>()
}

// 基础整数类型写入函数
pub fn write_u8(writer: &mut dyn Write, value: u8) -> Result<(), std::io::Error> {
    writer.write_u8(value)
}

pub fn write_u32(writer: &mut dyn Write, value: u32) -> Result<(), std::io::Error> {
    writer.write_u32::<LittleEndian>(value)
}

pub fn write_u64(writer: &mut dyn Write, value: u64) -> Result<(), std::io::Error> {
    writer.write_u64::<LittleEndian>(value)
}

/// 截断的索引数据统一视为解析失败
pub(crate) fn truncated(what: &str) -> impl FnOnce(std::io::Error) -> BsaError + '_ {
    move |_| BsaError::parse(format!("unexpected end of data while reading {}", what))
}

/// 取出归档中的一段数据，越界视为解析失败
///
/// 偏移和长度来自不可信的文件内容，必须先检查再访问。
pub(crate) fn slice_at<'a>(data: &'a [u8], start: u64, len: u64, what: &str) -> Result<&'a [u8], BsaError> {
    let range = start
        .checked_add(len)
        .filter(|&end| end <= data.len() as u64)
        .map(|end| start as usize..end as usize);

    match range {
        Some(range) => Ok(&data[range]),
        None => Err(BsaError::parse(format!(
            "{} at {} (+{} bytes) lies outside the archive ({} bytes)",
            what,
            start,
            len,
            data.len()
        ))),
    }
}

/// 预先分配索引容量，分配失败映射为内存不足
pub(crate) fn reserve_vec<T>(count: usize, what: &str) -> Result<Vec<T>, BsaError> {
    let mut items = Vec::new();
    items
        .try_reserve_exact(count)
        .map_err(|_| BsaError::OutOfMemory(format!("cannot allocate {} {}", count, what)))?;
    Ok(items)
}

/// 把名称编码为 Windows-1252（归档内部的文件名编码）
pub fn encode_name(name: &str) -> Result<Vec<u8>, BsaError> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(name);
    if had_errors {
        return Err(BsaError::BadStringEncoding(name.to_string()));
    }
    Ok(bytes.into_owned())
}

/// 把 Windows-1252 字节解码为字符串（每个字节都有对应字符，不会失败）
pub fn decode_name(bytes: &[u8]) -> String {
    WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()
}

/// Z字符串解析(以null结尾)，返回字符串字节和消耗的字节数（含终止符）
pub fn parse_zstring(data: &[u8]) -> Result<(&[u8], usize), BsaError> {
    let null_pos = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| BsaError::parse("unterminated name string"))?;
    Ok((&data[..null_pos], null_pos + 1))
}

/// BZ字符串解析(长度前缀，长度包含null终止符)
pub fn parse_bzstring(cursor: &mut Cursor<&[u8]>) -> Result<(Vec<u8>, u8), BsaError> {
    let length = read_u8(cursor).map_err(truncated("folder name length"))?;
    let mut buffer = vec![0u8; length as usize];
    cursor.read_exact(&mut buffer).map_err(truncated("folder name"))?;

    // 移除末尾的null字符
    if let Some(null_pos) = buffer.iter().position(|&b| b == 0) {
        buffer.truncate(null_pos);
    }

    Ok((buffer, length))
}

/// 写入BZ字符串
pub fn write_bzstring(writer: &mut dyn Write, bytes: &[u8]) -> Result<(), BsaError> {
    let length = u8::try_from(bytes.len() + 1)
        .map_err(|_| BsaError::invalid(format!("folder name longer than 254 bytes: {}", decode_name(bytes))))?;
    write_u8(writer, length)?;
    writer.write_all(bytes)?;
    write_u8(writer, 0)?;
    Ok(())
}

/// 写入B字符串
pub fn write_bstring(writer: &mut dyn Write, bytes: &[u8]) -> Result<(), BsaError> {
    let length = u8::try_from(bytes.len())
        .map_err(|_| BsaError::invalid(format!("embedded name longer than 255 bytes: {}", decode_name(bytes))))?;
    write_u8(writer, length)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// 把位置/长度转换为 u32 字段（归档内的偏移和大小都是 32 位）
pub(crate) fn to_u32(value: u64, what: &str) -> Result<u32, BsaError> {
    u32::try_from(value).map_err(|_| BsaError::invalid(format!("{} exceeds the 4 GiB format limit", what)))
}

/// 归档格式家族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Family {
    /// Morrowind 的扁平格式：顺序记录，无目录层级，无压缩
    Flat,
    /// Oblivion 之后的哈希格式：目录索引，哈希排序，可选压缩
    Hashed,
}

/// 磁盘上的归档版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ArchiveVersion {
    /// TES III: Morrowind
    Tes3,
    /// TES IV: Oblivion（版本号 103）
    Tes4,
    /// TES V: Skyrim、Fallout 3、Fallout: New Vegas（版本号 104）
    Tes5,
}

impl ArchiveVersion {
    /// 所属格式家族
    pub fn family(&self) -> Family {
        match self {
            ArchiveVersion::Tes3 => Family::Flat,
            ArchiveVersion::Tes4 | ArchiveVersion::Tes5 => Family::Hashed,
        }
    }

    /// 哈希格式头部中的版本字段
    pub fn header_version(&self) -> Option<u32> {
        match self {
            ArchiveVersion::Tes3 => None,
            ArchiveVersion::Tes4 => Some(TES4_VERSION),
            ArchiveVersion::Tes5 => Some(TES5_VERSION),
        }
    }

    /// 从哈希格式头部的版本字段识别
    pub fn from_header_version(version: u32) -> Option<Self> {
        match version {
            TES4_VERSION => Some(ArchiveVersion::Tes4),
            TES5_VERSION => Some(ArchiveVersion::Tes5),
            _ => None,
        }
    }

    /// 该版本是否允许压缩数据
    pub fn supports_compression(&self) -> bool {
        self.family() == Family::Hashed
    }
}

impl std::fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveVersion::Tes3 => write!(f, "TES3 (Morrowind)"),
            ArchiveVersion::Tes4 => write!(f, "TES4 (Oblivion, v103)"),
            ArchiveVersion::Tes5 => write!(f, "TES5 (Skyrim / Fallout 3 / New Vegas, v104)"),
        }
    }
}

/// Morrowind BSA 魔数
pub const TES3_MAGIC: u32 = 0x0000_0100;
/// Oblivion 及之后 BSA 魔数 "BSA\0"
pub const BSA_MAGIC: u32 = 0x0041_5342;
pub const TES4_VERSION: u32 = 0x67;
pub const TES5_VERSION: u32 = 0x68;

/// 单文件大小字段中的压缩反转位
pub const FILE_INVERT_COMPRESSED: u32 = 0x4000_0000;
/// 大小字段中不属于长度的位
pub const FILE_SIZE_FLAG_MASK: u32 = 0xC000_0000;

// 归档标志位定义
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArchiveFlags: u32 {
        const INCLUDE_DIRECTORY_NAMES = 0x0001;   // 包含目录名
        const INCLUDE_FILE_NAMES = 0x0002;        // 包含文件名
        const COMPRESSED = 0x0004;                // 默认压缩
        const RETAIN_DIRECTORY_NAMES = 0x0008;
        const RETAIN_FILE_NAMES = 0x0010;
        const RETAIN_FILE_NAME_OFFSETS = 0x0020;
        const XBOX360 = 0x0040;
        const RETAIN_STRINGS_DURING_STARTUP = 0x0080;
        const EMBED_FILE_NAMES = 0x0100;          // 数据块前嵌入完整路径（仅 v104）
        const XMEM_CODEC = 0x0200;
    }
}

// 内容类型标志位定义
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileFlags: u32 {
        const MESHES = 0x0001;
        const TEXTURES = 0x0002;
        const MENUS = 0x0004;
        const SOUNDS = 0x0008;
        const VOICES = 0x0010;
        const SHADERS = 0x0020;
        const TREES = 0x0040;
        const FONTS = 0x0080;
        const MISCELLANEOUS = 0x0100;
    }
}

impl FileFlags {
    /// 根据资源路径的顶层目录推断内容类型
    pub fn for_path(path: &str) -> FileFlags {
        let lower = path.to_lowercase();
        let top = lower.split('/').next().unwrap_or("");
        match top {
            "meshes" => FileFlags::MESHES,
            "textures" => FileFlags::TEXTURES,
            "menus" | "interface" => FileFlags::MENUS,
            "sound" if lower.starts_with("sound/voice/") => FileFlags::VOICES,
            "sound" | "music" => FileFlags::SOUNDS,
            "shaders" => FileFlags::SHADERS,
            "trees" => FileFlags::TREES,
            "fonts" => FileFlags::FONTS,
            _ => FileFlags::MISCELLANEOUS,
        }
    }
}
