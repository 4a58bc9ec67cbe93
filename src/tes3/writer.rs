use std::io::{Seek, SeekFrom, Write};

use log::debug;

use super::{Tes3Header, HEADER_SIZE, RECORD_SIZE};
use crate::asset::{Asset, PayloadReader};
use crate::datatypes::{encode_name, to_u32, write_u32};
use crate::hash::tes3_hash;
use crate::utils::BsaError;

/// 写出扁平格式归档
///
/// 记录按调用方给出的顺序排列；该格式不支持压缩，压缩存储的资源会先解压。
/// 名称保留原始大小写，分隔符统一为 `\`。
///
/// # 参数
/// * `out` - 输出流，必须位于起始位置
/// * `assets` - 要写入的资源
/// * `reader` - 读取资源内容
pub fn write<W: Write + Seek>(
    out: &mut W,
    assets: &[&Asset],
    reader: &PayloadReader,
) -> Result<Tes3Header, BsaError> {
    let mut names = Vec::new();
    let mut name_offsets = Vec::with_capacity(assets.len());
    let mut hashes = Vec::with_capacity(assets.len());

    for asset in assets {
        let name = asset.path.replace('/', "\\");
        name_offsets.push(to_u32(names.len() as u64, "name block")?);
        names.extend_from_slice(&encode_name(&name)?);
        names.push(0);
        hashes.push(tes3_hash(&name)?);
    }

    let file_count = to_u32(assets.len() as u64, "file count")?;
    let header = Tes3Header {
        hash_offset: to_u32(12 * u64::from(file_count) + names.len() as u64, "hash table offset")?,
        file_count,
    };

    header.write(out)?;

    // 大小和偏移要等数据写出后才知道，先写占位
    let records_pos = out.stream_position()?;
    debug_assert_eq!(records_pos, HEADER_SIZE);
    out.write_all(&vec![0u8; (RECORD_SIZE as usize) * assets.len()])?;

    for offset in &name_offsets {
        write_u32(out, *offset)?;
    }
    out.write_all(&names)?;
    for hash in &hashes {
        write_u32(out, *hash as u32)?;
        write_u32(out, (*hash >> 32) as u32)?;
    }

    let data_start = out.stream_position()?;
    debug_assert_eq!(data_start, header.data_start());

    let mut records = Vec::with_capacity(assets.len());
    for asset in assets {
        let payload = reader.stored(asset, false, 0)?;
        let offset = out.stream_position()? - data_start;
        records.push((
            to_u32(payload.len() as u64, "file size")?,
            to_u32(offset, "file offset")?,
        ));
        out.write_all(&payload)?;
    }
    let end = out.stream_position()?;

    // 回填记录表
    out.seek(SeekFrom::Start(records_pos))?;
    for (size, offset) in &records {
        write_u32(out, *size)?;
        write_u32(out, *offset)?;
    }
    out.seek(SeekFrom::Start(end))?;

    debug!("wrote Morrowind BSA: {} files, {} bytes", file_count, end);
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetSource;
    use crate::compression::encode_block;
    use crate::tes3::parse;
    use std::io::Cursor;

    #[test]
    fn test_write_then_parse() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = dir.path().join("first.nif");
        let second = dir.path().join("second.dds");
        std::fs::write(&first, b"first payload").unwrap();
        std::fs::write(&second, b"second").unwrap();

        let assets = vec![
            Asset::new("Meshes/First.nif", AssetSource::External(first)),
            Asset::new("textures/second.dds", AssetSource::External(second)),
        ];
        let refs: Vec<&Asset> = assets.iter().collect();

        let mut out = Cursor::new(Vec::new());
        let header = write(&mut out, &refs, &PayloadReader::empty()).unwrap();
        let bytes = out.into_inner();

        assert_eq!(header.file_count, 2);
        assert_eq!(bytes.len() as u64, header.data_start() + 13 + 6);

        let parsed = parse(&bytes).unwrap();
        // 调用方顺序、原始大小写
        assert_eq!(parsed[0].path, "Meshes/First.nif");
        assert_eq!(parsed[1].path, "textures/second.dds");

        let reader = PayloadReader::new(&bytes);
        assert_eq!(&reader.decoded(&parsed[0]).unwrap()[..], b"first payload");
        assert_eq!(&reader.decoded(&parsed[1]).unwrap()[..], b"second");
    }

    #[test]
    fn test_compressed_source_is_decompressed() {
        let payload = b"zlib payload zlib payload".to_vec();
        let block = encode_block(&payload, 6).unwrap();
        let source = Asset::new(
            "sound/a.wav",
            AssetSource::Archive { offset: 0, size: block.len() as u32, compressed: true },
        );

        let mut out = Cursor::new(Vec::new());
        write(&mut out, &[&source], &PayloadReader::new(&block)).unwrap();
        let bytes = out.into_inner();

        let parsed = parse(&bytes).unwrap();
        assert!(!parsed[0].is_compressed());
        assert_eq!(&PayloadReader::new(&bytes).decoded(&parsed[0]).unwrap()[..], &payload[..]);
    }

    #[test]
    fn test_unencodable_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a");
        std::fs::write(&file, b"x").unwrap();

        let asset = Asset::new("meshes/铁剑.nif", AssetSource::External(file));
        let err = write(&mut Cursor::new(Vec::new()), &[&asset], &PayloadReader::empty()).unwrap_err();
        assert!(matches!(err, BsaError::BadStringEncoding(_)));
    }
}
