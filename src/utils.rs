use std::path::{Path, PathBuf};
use thiserror::Error;

/// 自定义错误类型
///
/// 每个变体对应一个对外的返回码（见 [`ReturnCode`]），
/// 内部错误在这里统一收敛，不会有其他错误类型越过归档句柄的边界。
#[derive(Error, Debug)]
pub enum BsaError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("String cannot be represented in Windows-1252: {0:?}")]
    BadStringEncoding(String),

    #[error("Compression error: {0}")]
    Codec(String),

    #[error("Failed to parse archive: {0}")]
    ParseFailure(String),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

impl BsaError {
    /// 收敛为对外返回码
    pub fn code(&self) -> ReturnCode {
        match self {
            BsaError::InvalidArguments(_) | BsaError::Regex(_) => ReturnCode::InvalidArgs,
            BsaError::OutOfMemory(_) => ReturnCode::NoMem,
            BsaError::Filesystem(_) => ReturnCode::FilesystemError,
            BsaError::BadStringEncoding(_) => ReturnCode::BadString,
            BsaError::Codec(_) => ReturnCode::ZlibError,
            BsaError::ParseFailure(_) => ReturnCode::ParseFail,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BsaError::InvalidArguments(message.into())
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        BsaError::ParseFailure(message.into())
    }

    /// 归档数据损坏类错误（解析失败、解压失败），批量操作遇到时必须中止
    pub fn is_corruption(&self) -> bool {
        matches!(self, BsaError::ParseFailure(_) | BsaError::Codec(_))
    }
}

/// 对外返回码
///
/// 数值固定，外部绑定层可以直接转换。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReturnCode {
    Ok = 0,
    InvalidArgs = 1,
    NoMem = 2,
    FilesystemError = 3,
    BadString = 4,
    ZlibError = 5,
    ParseFail = 6,
}

impl ReturnCode {
    /// 最大的返回码数值
    pub const MAX: ReturnCode = ReturnCode::ParseFail;

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// 从操作结果获取返回码
    pub fn of<T>(result: &Result<T, BsaError>) -> Self {
        match result {
            Ok(_) => ReturnCode::Ok,
            Err(e) => e.code(),
        }
    }
}

/// 规范化归档内部路径：统一为 `/` 分隔符 + 移除前导 `/` + 合并重复分隔符
///
/// 保留原始大小写，比较时请使用 [`path_key`]。
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// 不区分大小写比较用的路径键：规范化 + 小写
pub fn path_key(path: &str) -> String {
    normalize_path(path).to_lowercase()
}

/// 把规范化路径拆分为 (dir, file)
///
/// - 如果没有 '/'，dir 为空字符串
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// 检查规范化后的内部路径能否安全地映射到文件系统
///
/// 拒绝空路径、`.`/`..` 组件以及带盘符的组件（归档内容不可信）。
pub fn is_safe_internal_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }

    path.split('/').all(|part| {
        !part.is_empty() && part != "." && part != ".." && !part.contains(':')
    })
}

/// 计算资源在目标目录下的输出路径，保持归档内部的目录结构
pub fn destination_for(root: &Path, internal_path: &str) -> Result<PathBuf, BsaError> {
    let normalized = normalize_path(internal_path);
    if !is_safe_internal_path(&normalized) {
        return Err(BsaError::parse(format!("unsafe asset path: {:?}", internal_path)));
    }

    let mut destination = root.to_path_buf();
    for part in normalized.split('/') {
        destination.push(part);
    }

    Ok(destination)
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<PathBuf, BsaError> {
    if !file_path.exists() {
        return Err(BsaError::Filesystem(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", file_path.display()),
        )));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let backup_path = file_path.with_extension(format!("{}.bak", timestamp));

    std::fs::copy(file_path, &backup_path)?;

    Ok(backup_path)
}
