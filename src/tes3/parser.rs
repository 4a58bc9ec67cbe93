use std::io::Cursor;

use log::{debug, warn};

use super::{Tes3Header, HASH_SIZE, NAME_OFFSET_SIZE, RECORD_SIZE};
use crate::asset::{Asset, AssetSource};
use crate::datatypes::{decode_name, parse_zstring, read_u32, reserve_vec, slice_at, truncated};
use crate::hash::tes3_hash;
use crate::utils::{is_safe_internal_path, normalize_path, BsaError};

/// 解析扁平格式归档
///
/// # 参数
/// * `data` - 整个归档文件的内容
///
/// # 返回
/// 按磁盘记录顺序排列的资源列表
pub fn parse(data: &[u8]) -> Result<Vec<Asset>, BsaError> {
    let mut cursor = Cursor::new(data);
    let header = Tes3Header::read(&mut cursor)?;
    let count = u64::from(header.file_count);

    // 名称块位于记录表之后、哈希表之前
    if header.hashes_start() < header.names_start() {
        return Err(BsaError::parse(format!(
            "hash table offset {} overlaps the record tables of {} files",
            header.hash_offset, header.file_count
        )));
    }
    if header.data_start() > data.len() as u64 {
        return Err(BsaError::parse(format!(
            "index of {} files runs past the end of the archive",
            header.file_count
        )));
    }

    let records = slice_at(data, super::HEADER_SIZE, RECORD_SIZE * count, "file records")?;
    let name_offsets = slice_at(data, header.names_start() - NAME_OFFSET_SIZE * count, NAME_OFFSET_SIZE * count, "name offsets")?;
    let names = slice_at(data, header.names_start(), header.hashes_start() - header.names_start(), "name block")?;
    let hashes = slice_at(data, header.hashes_start(), HASH_SIZE * count, "hash table")?;

    let mut record_cursor = Cursor::new(records);
    let mut offset_cursor = Cursor::new(name_offsets);
    let mut hash_cursor = Cursor::new(hashes);

    let mut assets = reserve_vec(header.file_count as usize, "asset entries")?;
    let data_start = header.data_start();

    for index in 0..header.file_count {
        let size = read_u32(&mut record_cursor).map_err(truncated("file record"))?;
        let offset = read_u32(&mut record_cursor).map_err(truncated("file record"))?;
        let name_offset = read_u32(&mut offset_cursor).map_err(truncated("name offset"))? as usize;
        let stored_low = read_u32(&mut hash_cursor).map_err(truncated("hash"))?;
        let stored_high = read_u32(&mut hash_cursor).map_err(truncated("hash"))?;

        let name_bytes = names
            .get(name_offset..)
            .ok_or_else(|| BsaError::parse(format!("name offset {} of file {} is out of range", name_offset, index)))?;
        let (name_bytes, _) = parse_zstring(name_bytes)?;
        let name = decode_name(name_bytes);

        let path = normalize_path(&name);
        if !is_safe_internal_path(&path) {
            return Err(BsaError::parse(format!("unsafe asset path: {:?}", name)));
        }

        let absolute = data_start + u64::from(offset);
        slice_at(data, absolute, u64::from(size), "file data")?;

        let stored_hash = u64::from(stored_low) | (u64::from(stored_high) << 32);
        if tes3_hash(&name).ok() != Some(stored_hash) {
            warn!("stored hash {:#018x} does not match name {:?}", stored_hash, name);
        }

        assets.push(Asset::new(
            path,
            AssetSource::Archive {
                offset: absolute,
                size,
                compressed: false,
            },
        ));
    }

    debug!("parsed Morrowind BSA: {} files, data at {}", assets.len(), data_start);
    Ok(assets)
}
