use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};

use log::debug;

use super::{embeds_names, FileRecord, FolderRecord, Tes4Header, FILE_RECORD_SIZE, FOLDER_RECORD_SIZE, HEADER_SIZE};
use crate::asset::{Asset, AssetSource, PayloadReader};
use crate::datatypes::{
    to_u32, write_bstring, write_bzstring, write_u8, ArchiveFlags, ArchiveVersion, FileFlags,
    FILE_INVERT_COMPRESSED, FILE_SIZE_FLAG_MASK,
};
use crate::hash::{hash_file, hash_folder, normalize_for_hash, ROOT_FOLDER};
use crate::options::Compression;
use crate::utils::{split_path, BsaError};

/// 写出参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteParams {
    pub version: ArchiveVersion,
    /// 沿用的归档标志（名称标志总会被设置，压缩标志由 `compression` 决定）
    pub archive_flags: ArchiveFlags,
    pub file_flags: FileFlags,
    pub compression: Compression,
}

impl WriteParams {
    /// 实际写入头部的归档标志
    pub fn resolved_flags(&self) -> ArchiveFlags {
        let mut flags = self.archive_flags
            | ArchiveFlags::INCLUDE_DIRECTORY_NAMES
            | ArchiveFlags::INCLUDE_FILE_NAMES;

        match self.compression {
            Compression::None => flags.remove(ArchiveFlags::COMPRESSED),
            Compression::Level(_) => flags.insert(ArchiveFlags::COMPRESSED),
            Compression::NoChange => {}
        }
        flags
    }

    /// 单个资源写出时是否压缩
    ///
    /// 保持不变时沿用资源原有状态，外部文件跟随归档默认值。
    fn compress(&self, asset: &Asset, compressed_by_default: bool) -> bool {
        match self.compression {
            Compression::None => false,
            Compression::Level(_) => true,
            Compression::NoChange => match asset.source {
                AssetSource::Archive { compressed, .. } => compressed,
                AssetSource::External(_) => compressed_by_default,
            },
        }
    }
}

struct FileEntry<'a> {
    name: Vec<u8>,
    asset: &'a Asset,
}

struct FolderEntry<'a> {
    name: Vec<u8>,
    files: BTreeMap<u64, FileEntry<'a>>,
}

/// 按目录分组，目录和文件都以哈希为键排序
fn group<'a>(assets: &[&'a Asset]) -> Result<BTreeMap<u64, FolderEntry<'a>>, BsaError> {
    let mut folders: BTreeMap<u64, FolderEntry<'a>> = BTreeMap::new();

    for &asset in assets {
        let (dir, file) = split_path(&asset.path);
        let folder_name = normalize_for_hash(if dir.is_empty() { ROOT_FOLDER } else { dir })?;
        let folder_hash = hash_folder(dir)?;
        let file_name = normalize_for_hash(file)?;
        let file_hash = hash_file(file)?;

        let folder = folders.entry(folder_hash).or_insert_with(|| FolderEntry {
            name: folder_name.clone(),
            files: BTreeMap::new(),
        });
        if folder.name != folder_name {
            return Err(BsaError::invalid(format!(
                "folder hash collision between {:?} and {:?}",
                String::from_utf8_lossy(&folder.name),
                dir
            )));
        }

        if let Some(existing) = folder.files.get(&file_hash) {
            return Err(BsaError::invalid(format!(
                "file hash collision in {:?}: {:?} and {:?}",
                dir,
                String::from_utf8_lossy(&existing.name),
                file
            )));
        }
        folder.files.insert(file_hash, FileEntry { name: file_name, asset });
    }

    Ok(folders)
}

/// 写出哈希格式归档
///
/// 目录和文件按哈希排序；目录记录的偏移可以预先算出，文件记录先写占位，
/// 数据写完后回填。
///
/// # 参数
/// * `out` - 输出流，必须位于起始位置
/// * `assets` - 要写入的资源（路径不能重复）
/// * `reader` - 读取资源内容
/// * `params` - 版本、标志和压缩策略
pub fn write<W: Write + Seek>(
    out: &mut W,
    assets: &[&Asset],
    reader: &PayloadReader,
    params: &WriteParams,
) -> Result<Tes4Header, BsaError> {
    if params.version == ArchiveVersion::Tes3 {
        return Err(BsaError::invalid("Morrowind archives use the flat layout"));
    }

    let folders = group(assets)?;
    let archive_flags = params.resolved_flags();
    let compressed_by_default = archive_flags.contains(ArchiveFlags::COMPRESSED);
    let embed = embeds_names(params.version, archive_flags);

    let folder_count = folders.len() as u64;
    let file_count: u64 = folders.values().map(|f| f.files.len() as u64).sum();
    let total_folder_name_length: u64 = folders.values().map(|f| f.name.len() as u64 + 1).sum();
    let total_file_name_length: u64 = folders
        .values()
        .flat_map(|f| f.files.values())
        .map(|file| file.name.len() as u64 + 1)
        .sum();

    let header = Tes4Header {
        version: params.version,
        offset: HEADER_SIZE,
        archive_flags,
        folder_count: to_u32(folder_count, "folder count")?,
        file_count: to_u32(file_count, "file count")?,
        total_folder_name_length: to_u32(total_folder_name_length, "folder name length")?,
        total_file_name_length: to_u32(total_file_name_length, "file name length")?,
        file_flags: params.file_flags,
    };
    header.write(out)?;

    // 目录记录：偏移指向目录名，外加文件名块长度
    let mut position = u64::from(HEADER_SIZE) + u64::from(FOLDER_RECORD_SIZE) * folder_count;
    for (hash, folder) in &folders {
        let count = folder.files.len() as u64;
        FolderRecord {
            hash: *hash,
            count: to_u32(count, "folder file count")?,
            offset: to_u32(position + total_file_name_length, "folder offset")?,
        }
        .write(out)?;
        position += 1 + folder.name.len() as u64 + 1 + u64::from(FILE_RECORD_SIZE) * count;
    }

    // 目录块：目录名 + 文件记录占位
    let mut record_positions = Vec::with_capacity(file_count as usize);
    let mut block_position = u64::from(HEADER_SIZE) + u64::from(FOLDER_RECORD_SIZE) * folder_count;
    for folder in folders.values() {
        write_bzstring(out, &folder.name)?;
        block_position += folder.name.len() as u64 + 2;
        for _ in folder.files.values() {
            record_positions.push(block_position);
            out.write_all(&[0u8; FILE_RECORD_SIZE as usize])?;
            block_position += u64::from(FILE_RECORD_SIZE);
        }
    }
    debug_assert_eq!(block_position, position);

    for file in folders.values().flat_map(|f| f.files.values()) {
        out.write_all(&file.name)?;
        write_u8(out, 0)?;
    }

    // 数据区
    let level = params.compression.zlib_level();
    let mut position = position + total_file_name_length;
    let mut records = Vec::with_capacity(file_count as usize);
    for folder in folders.values() {
        for (hash, file) in &folder.files {
            let compress = params.compress(file.asset, compressed_by_default);
            let offset = position;

            if embed {
                let mut full_name = Vec::with_capacity(folder.name.len() + 1 + file.name.len());
                if folder.name != ROOT_FOLDER.as_bytes() {
                    full_name.extend_from_slice(&folder.name);
                    full_name.push(b'\\');
                }
                full_name.extend_from_slice(&file.name);
                write_bstring(out, &full_name)?;
                position += 1 + full_name.len() as u64;
            }

            let payload = reader.stored(file.asset, compress, level)?;
            out.write_all(&payload)?;
            position += payload.len() as u64;

            let size = to_u32(position - offset, "file size")?;
            if size & FILE_SIZE_FLAG_MASK != 0 {
                return Err(BsaError::invalid(format!(
                    "{} is too large for a BSA entry ({} bytes)",
                    file.asset.path, size
                )));
            }

            records.push(FileRecord {
                hash: *hash,
                size: if compress != compressed_by_default { size | FILE_INVERT_COMPRESSED } else { size },
                offset: to_u32(offset, "file offset")?,
            });
        }
    }

    // 回填文件记录
    for (record_position, record) in record_positions.iter().zip(&records) {
        out.seek(SeekFrom::Start(*record_position))?;
        record.write(out)?;
    }
    out.seek(SeekFrom::Start(position))?;

    debug!(
        "wrote {} BSA: {} folders, {} files, {} bytes",
        params.version, folder_count, file_count, position
    );
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tes4::parse;
    use std::io::Cursor;
    use std::path::Path;

    fn external(dir: &Path, path: &str, data: &[u8]) -> Asset {
        let file = dir.join(path.replace('/', "_"));
        std::fs::write(&file, data).unwrap();
        Asset::new(path, AssetSource::External(file))
    }

    fn params(version: ArchiveVersion, compression: Compression) -> WriteParams {
        WriteParams {
            version,
            archive_flags: ArchiveFlags::empty(),
            file_flags: FileFlags::MESHES,
            compression,
        }
    }

    fn write_to_vec(assets: &[Asset], params: &WriteParams) -> Vec<u8> {
        let refs: Vec<&Asset> = assets.iter().collect();
        let mut out = Cursor::new(Vec::new());
        write(&mut out, &refs, &PayloadReader::empty(), params).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_sorted_by_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let assets = vec![
            external(dir.path(), "textures/b.dds", b"b"),
            external(dir.path(), "meshes/a.nif", b"a"),
            external(dir.path(), "meshes/c.nif", b"c"),
            external(dir.path(), "readme.txt", b"root"),
        ];
        let bytes = write_to_vec(&assets, &params(ArchiveVersion::Tes5, Compression::None));

        let (header, parsed) = parse(&bytes).unwrap();
        assert_eq!(header.folder_count, 3);
        assert_eq!(header.file_count, 4);

        // 目录按哈希升序
        let mut cursor = Cursor::new(&bytes[36..]);
        let mut previous = 0u64;
        for _ in 0..3 {
            let record = FolderRecord::read(&mut cursor).unwrap();
            assert!(record.hash > previous);
            previous = record.hash;
        }

        let mut paths: Vec<&str> = parsed.iter().map(|a| a.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["meshes/a.nif", "meshes/c.nif", "readme.txt", "textures/b.dds"]);
    }

    #[test]
    fn test_folder_offsets_include_file_name_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let assets = vec![external(dir.path(), "meshes/a.nif", b"a")];
        let bytes = write_to_vec(&assets, &params(ArchiveVersion::Tes4, Compression::None));

        let (header, _) = parse(&bytes).unwrap();
        let record = FolderRecord::read(&mut Cursor::new(&bytes[36..])).unwrap();
        // 目录名紧跟在唯一的目录记录之后
        assert_eq!(record.offset, 36 + 16 + header.total_file_name_length);
        assert_eq!(header.total_folder_name_length, 7);
        assert_eq!(header.total_file_name_length, 6);
    }

    #[test]
    fn test_compressed_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let payload = b"abcabcabcabcabcabcabcabcabcabcabc".repeat(8);
        let assets = vec![external(dir.path(), "meshes/a.nif", &payload)];
        let bytes = write_to_vec(&assets, &params(ArchiveVersion::Tes5, Compression::Level(9)));

        let (header, parsed) = parse(&bytes).unwrap();
        assert!(header.compressed_by_default());
        assert!(parsed[0].is_compressed());

        let reader = PayloadReader::new(&bytes);
        assert_eq!(&reader.decoded(&parsed[0]).unwrap()[..], &payload[..]);
        assert_eq!(reader.decoded_len(&parsed[0]).unwrap(), payload.len() as u64);
    }

    #[test]
    fn test_nochange_sets_invert_bit() {
        let dir = tempfile::TempDir::new().unwrap();
        let payload = b"inverted inverted inverted".to_vec();
        let block = crate::compression::encode_block(&payload, 6).unwrap();
        let compressed = Asset::new(
            "meshes/packed.nif",
            AssetSource::Archive { offset: 0, size: block.len() as u32, compressed: true },
        );
        let plain = external(dir.path(), "meshes/plain.nif", b"plain");

        let mut out = Cursor::new(Vec::new());
        write(
            &mut out,
            &[&compressed, &plain],
            &PayloadReader::new(&block),
            &params(ArchiveVersion::Tes5, Compression::NoChange),
        )
        .unwrap();
        let bytes = out.into_inner();

        let (header, parsed) = parse(&bytes).unwrap();
        assert!(!header.compressed_by_default());

        let packed = parsed.iter().find(|a| a.path == "meshes/packed.nif").unwrap();
        let unpacked = parsed.iter().find(|a| a.path == "meshes/plain.nif").unwrap();
        assert!(packed.is_compressed());
        assert!(!unpacked.is_compressed());

        let reader = PayloadReader::new(&bytes);
        assert_eq!(&reader.decoded(packed).unwrap()[..], &payload[..]);
        assert_eq!(&reader.decoded(unpacked).unwrap()[..], b"plain");
    }

    #[test]
    fn test_embedded_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let assets = vec![external(dir.path(), "Meshes/A.nif", b"payload")];
        let params = WriteParams {
            archive_flags: ArchiveFlags::EMBED_FILE_NAMES,
            ..params(ArchiveVersion::Tes5, Compression::None)
        };
        let bytes = write_to_vec(&assets, &params);

        let (header, parsed) = parse(&bytes).unwrap();
        assert!(header.embeds_names());
        match parsed[0].source {
            AssetSource::Archive { offset, size, .. } => {
                let prefix = &bytes[offset as usize - 13..offset as usize];
                assert_eq!(prefix, b"\x0cmeshes\\a.nif");
                assert_eq!(size, 7);
            }
            _ => panic!("expected archive source"),
        }
        assert_eq!(&PayloadReader::new(&bytes).decoded(&parsed[0]).unwrap()[..], b"payload");
    }

    #[test]
    fn test_names_are_lowercased() {
        let dir = tempfile::TempDir::new().unwrap();
        let assets = vec![external(dir.path(), "Textures/Armor/Iron.DDS", b"x")];
        let bytes = write_to_vec(&assets, &params(ArchiveVersion::Tes4, Compression::None));

        let (_, parsed) = parse(&bytes).unwrap();
        assert_eq!(parsed[0].path, "textures/armor/iron.dds");
    }

    #[test]
    fn test_empty_archive() {
        let bytes = write_to_vec(&[], &params(ArchiveVersion::Tes5, Compression::None));
        assert_eq!(bytes.len(), 36);

        let (header, parsed) = parse(&bytes).unwrap();
        assert_eq!(header.folder_count, 0);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_rejects_tes3() {
        let mut out = Cursor::new(Vec::new());
        let err = write(&mut out, &[], &PayloadReader::empty(), &params(ArchiveVersion::Tes3, Compression::None));
        assert!(matches!(err, Err(BsaError::InvalidArguments(_))));
        assert!(out.into_inner().is_empty());
    }
}
