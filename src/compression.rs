//! zlib 压缩/解压
//!
//! 压缩数据块的磁盘格式：`u32 原始大小` + zlib 数据流。

use std::io::{Cursor, Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::datatypes::read_u32;
use crate::utils::BsaError;

/// 未指定压缩级别时使用的默认级别
pub const DEFAULT_LEVEL: u32 = 6;

/// 压缩数据
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, BsaError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| BsaError::Codec(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| BsaError::Codec(format!("compression failed: {}", e)))
}

/// 解压缩数据，输出长度必须与期望长度一致
pub fn decompress(data: &[u8], expected_size: u32) -> Result<Vec<u8>, BsaError> {
    let mut decompressed = Vec::new();
    decompressed
        .try_reserve_exact(expected_size as usize)
        .map_err(|_| BsaError::OutOfMemory(format!("cannot allocate {} bytes for decompression", expected_size)))?;

    // 多读一个字节用于发现超长数据，同时防止解压炸弹
    let decoder = ZlibDecoder::new(data);
    decoder
        .take(u64::from(expected_size) + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| BsaError::Codec(format!("decompression failed: {}", e)))?;

    if decompressed.len() != expected_size as usize {
        return Err(BsaError::Codec(format!(
            "decompressed size mismatch: expected {} bytes, got {}",
            expected_size,
            decompressed.len()
        )));
    }

    Ok(decompressed)
}

/// 读取压缩块头部记录的原始大小
pub fn block_original_size(block: &[u8]) -> Result<u32, BsaError> {
    if block.len() < 4 {
        return Err(BsaError::Codec("compressed block too short to hold its original size".to_string()));
    }
    let mut cursor = Cursor::new(block);
    read_u32(&mut cursor).map_err(|e| BsaError::Codec(e.to_string()))
}

/// 编码为压缩块：原始大小前缀 + zlib 数据
pub fn encode_block(data: &[u8], level: u32) -> Result<Vec<u8>, BsaError> {
    let original_size = u32::try_from(data.len())
        .map_err(|_| BsaError::invalid("asset larger than 4 GiB cannot be stored"))?;
    let compressed = compress(data, level)?;

    let mut result = Vec::with_capacity(compressed.len() + 4);
    result.extend_from_slice(&original_size.to_le_bytes());
    result.extend_from_slice(&compressed);
    Ok(result)
}

/// 解码压缩块
pub fn decode_block(block: &[u8]) -> Result<Vec<u8>, BsaError> {
    let original_size = block_original_size(block)?;
    decompress(&block[4..], original_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip() {
        let data = b"Iron Sword Iron Sword Iron Sword Iron Sword".repeat(10);
        let block = encode_block(&data, 9).unwrap();

        assert_eq!(block_original_size(&block).unwrap(), data.len() as u32);
        assert!(block.len() < data.len());
        assert_eq!(&block[4..6], &[0x78, 0xDA]);
        assert_eq!(decode_block(&block).unwrap(), data);
    }

    #[test]
    fn test_empty_payload() {
        let block = encode_block(b"", DEFAULT_LEVEL).unwrap();
        assert_eq!(decode_block(&block).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_size_mismatch_is_codec_error() {
        let mut block = encode_block(b"hello world", 1).unwrap();
        block[0] = 3;
        let err = decode_block(&block).unwrap_err();
        assert!(matches!(err, BsaError::Codec(_)));
        assert!(err.is_corruption());
        assert_eq!(
            err.to_string(),
            "Compression error: decompressed size mismatch: expected 3 bytes, got 4"
        );
    }

    #[test]
    fn test_garbage_is_codec_error() {
        let block = [4u8, 0, 0, 0, 0xDE, 0xAD, 0xBE, 0xEF];
        assert!(matches!(decode_block(&block), Err(BsaError::Codec(_))));
        assert!(matches!(decode_block(&[1, 2]), Err(BsaError::Codec(_))));
    }
}
