use std::borrow::Cow;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compression::{block_original_size, decode_block, encode_block};
use crate::utils::BsaError;

/// 资源内容的来源
///
/// 从磁盘读取的资源引用打开的归档内的一段数据，
/// 待写入的资源引用外部文件，二者只会存在其一。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// 归档内的数据块
    Archive {
        /// 数据块在归档文件中的绝对偏移（已跳过嵌入的文件名）
        offset: u64,
        /// 数据块长度（已去掉标志位和嵌入的文件名）
        size: u32,
        /// 实际压缩状态（归档默认值与单文件反转位异或后的结果）
        compressed: bool,
    },
    /// 外部文件，保存时读取
    External(PathBuf),
}

/// 归档中的一个逻辑文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// 规范化的内部路径（`/` 分隔，保留原始大小写）
    pub path: String,
    pub source: AssetSource,
}

impl Asset {
    pub fn new(path: impl Into<String>, source: AssetSource) -> Self {
        Asset {
            path: path.into(),
            source,
        }
    }

    /// 资源当前是否以压缩形式存储
    pub fn is_compressed(&self) -> bool {
        matches!(self.source, AssetSource::Archive { compressed: true, .. })
    }

    /// 是否为尚未写入归档的外部文件
    pub fn is_staged(&self) -> bool {
        matches!(self.source, AssetSource::External(_))
    }

    /// 可序列化的摘要信息
    pub fn info(&self) -> AssetInfo {
        let (stored_size, source_file) = match &self.source {
            AssetSource::Archive { size, .. } => (Some(*size), None),
            AssetSource::External(file) => (None, Some(file.clone())),
        };

        AssetInfo {
            path: self.path.clone(),
            stored_size,
            compressed: self.is_compressed(),
            source_file,
        }
    }
}

/// 资源摘要（用于列表输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub path: String,
    /// 归档内存储的字节数，外部文件为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_size: Option<u32>,
    pub compressed: bool,
    /// 待写入资源的来源文件
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
}

/// 资源数据读取器
///
/// 持有打开归档的完整字节视图（内存映射），按需返回存储形式、解压后或重新编码后的数据。
/// 不需要转换时直接借用映射中的数据，避免拷贝。
pub struct PayloadReader<'a> {
    data: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PayloadReader { data }
    }

    /// 没有后备文件的读取器（新建归档，只包含外部文件）
    pub fn empty() -> Self {
        PayloadReader { data: &[] }
    }

    /// 归档内的原始数据块
    pub fn raw_block(&self, offset: u64, size: u32) -> Result<&'a [u8], BsaError> {
        let start = usize::try_from(offset)
            .map_err(|_| BsaError::parse(format!("data offset {} out of range", offset)))?;
        start
            .checked_add(size as usize)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                BsaError::parse(format!(
                    "data block at {} (+{} bytes) lies outside the archive ({} bytes)",
                    offset,
                    size,
                    self.data.len()
                ))
            })
    }

    /// 解压后的资源内容
    pub fn decoded(&self, asset: &Asset) -> Result<Cow<'a, [u8]>, BsaError> {
        match &asset.source {
            AssetSource::Archive { offset, size, compressed } => {
                let block = self.raw_block(*offset, *size)?;
                if *compressed {
                    Ok(Cow::Owned(decode_block(block)?))
                } else {
                    Ok(Cow::Borrowed(block))
                }
            }
            AssetSource::External(file) => Ok(Cow::Owned(std::fs::read(file)?)),
        }
    }

    /// 解压后的内容长度（压缩块读取头部记录的原始大小，不解压）
    pub fn decoded_len(&self, asset: &Asset) -> Result<u64, BsaError> {
        match &asset.source {
            AssetSource::Archive { offset, size, compressed } => {
                if *compressed {
                    let block = self.raw_block(*offset, *size)?;
                    Ok(u64::from(block_original_size(block)?))
                } else {
                    Ok(u64::from(*size))
                }
            }
            AssetSource::External(file) => Ok(std::fs::metadata(file)?.len()),
        }
    }

    /// 按目标压缩状态返回要写入新归档的数据
    ///
    /// 存储状态与目标一致时原样复制数据块，否则解压或以 `level` 重新压缩。
    pub fn stored(&self, asset: &Asset, compress: bool, level: u32) -> Result<Cow<'a, [u8]>, BsaError> {
        if let AssetSource::Archive { offset, size, compressed } = &asset.source {
            if *compressed == compress {
                return Ok(Cow::Borrowed(self.raw_block(*offset, *size)?));
            }
        }

        let decoded = self.decoded(asset)?;
        if compress {
            Ok(Cow::Owned(encode_block(&decoded, level)?))
        } else {
            Ok(decoded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_asset(offset: u64, size: u32, compressed: bool) -> Asset {
        Asset::new("meshes/a.nif", AssetSource::Archive { offset, size, compressed })
    }

    #[test]
    fn test_uncompressed_is_borrowed() {
        let data = b"headerPAYLOADtrailer";
        let reader = PayloadReader::new(data);
        let asset = archive_asset(6, 7, false);

        let decoded = reader.decoded(&asset).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(&decoded[..], b"PAYLOAD");
        assert_eq!(reader.decoded_len(&asset).unwrap(), 7);
    }

    #[test]
    fn test_compressed_block() {
        let payload = b"compressed payload ".repeat(20);
        let mut data = vec![0xAAu8; 3];
        let block = encode_block(&payload, 9).unwrap();
        data.extend_from_slice(&block);

        let reader = PayloadReader::new(&data);
        let asset = archive_asset(3, block.len() as u32, true);

        assert_eq!(&reader.decoded(&asset).unwrap()[..], &payload[..]);
        assert_eq!(reader.decoded_len(&asset).unwrap(), payload.len() as u64);

        // 状态不变时原样复制
        let same = reader.stored(&asset, true, 1).unwrap();
        assert_eq!(&same[..], &block[..]);

        // 改为不压缩时解压
        let plain = reader.stored(&asset, false, 0).unwrap();
        assert_eq!(&plain[..], &payload[..]);
    }

    #[test]
    fn test_out_of_range_block_is_parse_failure() {
        let reader = PayloadReader::new(b"tiny");
        let err = reader.decoded(&archive_asset(2, 10, false)).unwrap_err();
        assert!(matches!(err, BsaError::ParseFailure(_)));

        let err = reader.raw_block(u64::MAX, 1).unwrap_err();
        assert!(matches!(err, BsaError::ParseFailure(_)));
    }

    #[test]
    fn test_external_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"external").unwrap();

        let asset = Asset::new("misc/a.txt", AssetSource::External(file.clone()));
        let reader = PayloadReader::empty();
        assert!(asset.is_staged());
        assert_eq!(&reader.decoded(&asset).unwrap()[..], b"external");
        assert_eq!(reader.decoded_len(&asset).unwrap(), 8);

        let block = reader.stored(&asset, true, 6).unwrap();
        assert_eq!(decode_block(&block).unwrap(), b"external");

        let info = asset.info();
        assert_eq!(info.source_file, Some(file));
        assert_eq!(info.stored_size, None);
    }
}
