use std::io::Cursor;

use log::{debug, warn};

use super::{FileRecord, FolderRecord, Tes4Header, FILE_RECORD_SIZE, FOLDER_RECORD_SIZE, HEADER_SIZE};
use crate::asset::{Asset, AssetSource};
use crate::datatypes::{
    decode_name, parse_bzstring, parse_zstring, reserve_vec, slice_at, ArchiveFlags,
    FILE_INVERT_COMPRESSED, FILE_SIZE_FLAG_MASK,
};
use crate::hash::{hash_file, hash_folder, ROOT_FOLDER};
use crate::utils::{is_safe_internal_path, normalize_path, BsaError};

/// 一个目录块：目录名 + 文件记录
struct FolderBlock {
    name: String,
    files: Vec<FileRecord>,
}

/// 解析哈希格式归档
///
/// 所有偏移和长度都先与文件长度比对再使用；目录数、文件数与名称块长度必须互相吻合，
/// 否则视为损坏。
///
/// # 参数
/// * `data` - 整个归档文件的内容
///
/// # 返回
/// 头部以及按磁盘顺序（目录顺序、目录内文件顺序）排列的资源列表
pub fn parse(data: &[u8]) -> Result<(Tes4Header, Vec<Asset>), BsaError> {
    let mut cursor = Cursor::new(data);
    let header = Tes4Header::read(&mut cursor)?;

    let required = ArchiveFlags::INCLUDE_DIRECTORY_NAMES | ArchiveFlags::INCLUDE_FILE_NAMES;
    if !header.archive_flags.contains(required) {
        return Err(BsaError::parse(
            "archives without embedded folder and file names are not supported",
        ));
    }
    if header.offset < HEADER_SIZE {
        return Err(BsaError::parse(format!("folder records start inside the header ({})", header.offset)));
    }

    let folders = read_folders(data, &header)?;
    let names = read_file_names(data, &header, folders.end)?;

    let mut assets = reserve_vec(header.file_count as usize, "asset entries")?;
    let compressed_by_default = header.compressed_by_default();
    let embeds_names = header.embeds_names();
    let mut names = names.into_iter();

    for (record, block) in folders.blocks {
        if hash_folder(&block.name).ok() != Some(record.hash) {
            warn!("stored hash {:#018x} does not match folder {:?}", record.hash, block.name);
        }

        for file in block.files {
            // 文件数已与名称数核对过
            let file_name = names
                .next()
                .ok_or_else(|| BsaError::parse("file name block is shorter than the file records"))?;

            if hash_file(&file_name).ok() != Some(file.hash) {
                warn!("stored hash {:#018x} does not match file {:?}", file.hash, file_name);
            }

            let path = if block.name.is_empty() || block.name == ROOT_FOLDER {
                normalize_path(&file_name)
            } else {
                normalize_path(&format!("{}/{}", block.name, file_name))
            };
            if !is_safe_internal_path(&path) {
                return Err(BsaError::parse(format!("unsafe asset path: {:?}\\{:?}", block.name, file_name)));
            }

            let compressed = compressed_by_default ^ (file.size & FILE_INVERT_COMPRESSED != 0);
            let stored_size = file.size & !FILE_SIZE_FLAG_MASK;
            let block_data = slice_at(data, u64::from(file.offset), u64::from(stored_size), "file data")?;

            let mut offset = u64::from(file.offset);
            let mut size = stored_size;
            if embeds_names {
                // bstring 前缀：长度字节 + 完整路径
                let prefix = 1 + u32::from(*block_data.first().ok_or_else(|| {
                    BsaError::parse(format!("{}: data block too small for its embedded name", path))
                })?);
                if prefix > stored_size {
                    return Err(BsaError::parse(format!("{}: embedded name runs past the data block", path)));
                }
                offset += u64::from(prefix);
                size -= prefix;
            }

            assets.push(Asset::new(path, AssetSource::Archive { offset, size, compressed }));
        }
    }

    debug!(
        "parsed {} BSA: {} folders, {} files, flags {:#x}",
        header.version,
        header.folder_count,
        assets.len(),
        header.archive_flags.bits()
    );
    Ok((header, assets))
}

/// 目录记录表和目录块的解析结果
struct Folders {
    blocks: Vec<(FolderRecord, FolderBlock)>,
    /// 最后一个目录块之后的位置（文件名块起点）
    end: u64,
}

fn read_folders(data: &[u8], header: &Tes4Header) -> Result<Folders, BsaError> {
    let table = slice_at(
        data,
        u64::from(header.offset),
        u64::from(FOLDER_RECORD_SIZE) * u64::from(header.folder_count),
        "folder records",
    )?;

    let mut cursor = Cursor::new(table);
    let mut records = reserve_vec(header.folder_count as usize, "folder records")?;
    for _ in 0..header.folder_count {
        records.push(FolderRecord::read(&mut cursor)?);
    }

    let total_files: u64 = records.iter().map(|r| u64::from(r.count)).sum();
    if total_files != u64::from(header.file_count) {
        return Err(BsaError::parse(format!(
            "folder records list {} files but the header declares {}",
            total_files, header.file_count
        )));
    }

    let mut position = u64::from(header.offset) + table.len() as u64;
    let mut folder_name_total = 0u64;
    let mut blocks = reserve_vec(records.len(), "folder blocks")?;

    for record in records {
        let expected = u64::from(record.offset).wrapping_sub(u64::from(header.total_file_name_length));
        if expected != position {
            debug!("folder record points at {} but its block is at {}", expected, position);
        }

        let remaining = slice_at(data, position, data.len() as u64 - position.min(data.len() as u64), "folder block")?;
        let mut cursor = Cursor::new(remaining);
        let (name, length) = parse_bzstring(&mut cursor)?;
        folder_name_total += u64::from(length);

        let records_len = u64::from(FILE_RECORD_SIZE) * u64::from(record.count);
        let file_table = slice_at(remaining, cursor.position(), records_len, "file records")?;
        let mut file_cursor = Cursor::new(file_table);
        let mut files = reserve_vec(record.count as usize, "file records")?;
        for _ in 0..record.count {
            files.push(FileRecord::read(&mut file_cursor)?);
        }

        position += cursor.position() + records_len;
        blocks.push((record, FolderBlock { name: decode_name(&name), files }));
    }

    if folder_name_total != u64::from(header.total_folder_name_length) {
        return Err(BsaError::parse(format!(
            "folder names occupy {} bytes but the header declares {}",
            folder_name_total, header.total_folder_name_length
        )));
    }

    Ok(Folders { blocks, end: position })
}

fn read_file_names(data: &[u8], header: &Tes4Header, start: u64) -> Result<Vec<String>, BsaError> {
    let block = slice_at(data, start, u64::from(header.total_file_name_length), "file name block")?;

    let mut names = reserve_vec(header.file_count as usize, "file names")?;
    let mut position = 0usize;
    for _ in 0..header.file_count {
        let rest = block
            .get(position..)
            .ok_or_else(|| BsaError::parse("file name block is shorter than the file records"))?;
        let (name, used) = parse_zstring(rest)?;
        names.push(decode_name(name));
        position += used;
    }

    if position != block.len() {
        return Err(BsaError::parse(format!(
            "file name block holds {} bytes beyond the {} declared names",
            block.len() - position,
            header.file_count
        )));
    }

    Ok(names)
}
