//! 格式识别
//!
//! 只读取文件开头的魔数和版本字段（最多 8 字节），不会读取整个文件，
//! 返回后也不再持有文件句柄。

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::datatypes::{read_u32, ArchiveVersion, BSA_MAGIC, TES3_MAGIC};
use crate::utils::BsaError;

/// 识别所需的最大前缀长度
pub const PREFIX_LEN: usize = 8;

/// 识别文件的归档版本
///
/// # 参数
/// * `path` - 归档路径
///
/// # 返回
/// - `Ok(Some(version))`：识别成功
/// - `Ok(None)`：文件不存在、为空或魔数/版本都不匹配
/// - `Err(Filesystem)`：文件存在但无法读取
pub fn detect(path: &Path) -> Result<Option<ArchiveVersion>, BsaError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut prefix = Vec::with_capacity(PREFIX_LEN);
    file.take(PREFIX_LEN as u64).read_to_end(&mut prefix)?;

    Ok(detect_bytes(&prefix))
}

/// 根据文件前缀识别归档版本
pub fn detect_bytes(prefix: &[u8]) -> Option<ArchiveVersion> {
    let mut cursor = Cursor::new(prefix);
    let magic = read_u32(&mut cursor).ok()?;

    match magic {
        TES3_MAGIC => Some(ArchiveVersion::Tes3),
        BSA_MAGIC => {
            let version = read_u32(&mut cursor).ok()?;
            ArchiveVersion::from_header_version(version)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_bytes() {
        assert_eq!(detect_bytes(&[0x00, 0x01, 0x00, 0x00]), Some(ArchiveVersion::Tes3));
        assert_eq!(detect_bytes(b"BSA\0\x67\0\0\0"), Some(ArchiveVersion::Tes4));
        assert_eq!(detect_bytes(b"BSA\0\x68\0\0\0"), Some(ArchiveVersion::Tes5));
    }

    #[test]
    fn test_unrecognized() {
        // 105 是 Skyrim SE 的 LZ4 版本，不在支持范围内
        assert_eq!(detect_bytes(b"BSA\0\x69\0\0\0"), None);
        assert_eq!(detect_bytes(b"BTDX\x01\0\0\0"), None);
        assert_eq!(detect_bytes(b"BSA\0"), None);
        assert_eq!(detect_bytes(b""), None);
    }

    #[test]
    fn test_detect_file() {
        let dir = tempfile::TempDir::new().unwrap();

        assert_eq!(detect(&dir.path().join("missing.bsa")).unwrap(), None);

        let file = dir.path().join("oblivion.bsa");
        let mut bytes = b"BSA\0\x67\0\0\0".to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&file, bytes).unwrap();
        assert_eq!(detect(&file).unwrap(), Some(ArchiveVersion::Tes4));

        let empty = dir.path().join("empty.bsa");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(detect(&empty).unwrap(), None);
    }
}
