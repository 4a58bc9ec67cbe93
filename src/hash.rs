//! 路径哈希
//!
//! - 哈希格式（Oblivion 及之后）：目录与文件共用的 64 位哈希，低 32 位由首尾字符、
//!   长度和扩展名魔数组成，高 32 位是中间字符与扩展名的滚动哈希之和。
//! - 扁平格式（Morrowind）：把名称一分为二，分别做异或折叠和旋转异或。
//!
//! 两种算法都是固定的历史算法，必须逐位一致，否则现有归档无法往返。
//! 输入统一小写、分隔符统一为 `\`、按 Windows-1252 编码后再计算。

use crate::datatypes::encode_name;
use crate::utils::BsaError;

/// 根目录下的文件归属的目录名
pub const ROOT_FOLDER: &str = ".";

/// 滚动哈希
pub fn hash_string(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |hash, &b| hash.wrapping_mul(0x1003F).wrapping_add(u32::from(b)))
}

/// 计算主干（不含扩展名）+ 扩展名（含点）的 64 位哈希
///
/// 调用方负责预先规范化（小写、`\` 分隔）。
pub fn calc_hash(stem: &[u8], extension: &[u8]) -> u64 {
    let len = stem.len();
    let mut low: u32 = 0;
    let mut high: u32 = 0;

    if len > 0 {
        let second_to_last = if len > 2 { u32::from(stem[len - 2]) } else { 0 };
        // 长度超过 255 时只取低 8 位
        low = u32::from(stem[len - 1])
            .wrapping_add(second_to_last << 8)
            .wrapping_add(((len as u32) & 0xFF) << 16)
            .wrapping_add(u32::from(stem[0]) << 24);

        if len > 3 {
            high = hash_string(&stem[1..len - 2]);
        }
    }

    if !extension.is_empty() {
        low |= match extension {
            b".kf" => 0x80,
            b".nif" => 0x8000,
            b".dds" => 0x8080,
            b".wav" => 0x8000_0000,
            _ => 0,
        };
        high = high.wrapping_add(hash_string(extension));
    }

    (u64::from(high) << 32) | u64::from(low)
}

/// 规范化后编码：小写 + `\` 分隔 + Windows-1252
pub fn normalize_for_hash(path: &str) -> Result<Vec<u8>, BsaError> {
    let lowered = path.to_lowercase().replace('/', "\\");
    encode_name(&lowered)
}

/// 目录哈希，空目录名等同于根目录 `.`
pub fn hash_folder(folder: &str) -> Result<u64, BsaError> {
    let folder = if folder.is_empty() { ROOT_FOLDER } else { folder };
    let bytes = normalize_for_hash(folder)?;
    Ok(calc_hash(&bytes, b""))
}

/// 文件名哈希（只接受文件名，不含目录）
pub fn hash_file(file_name: &str) -> Result<u64, BsaError> {
    let bytes = normalize_for_hash(file_name)?;
    let (stem, extension) = match bytes.iter().rposition(|&b| b == b'.') {
        Some(pos) => bytes.split_at(pos),
        None => (&bytes[..], &b""[..]),
    };
    Ok(calc_hash(stem, extension))
}

/// Morrowind 扁平格式的名称哈希
///
/// 返回值低 32 位与高 32 位分别对应磁盘上的两个 u32 字段。
pub fn tes3_hash(path: &str) -> Result<u64, BsaError> {
    let bytes = normalize_for_hash(path)?;
    let (first, second) = bytes.split_at(bytes.len() / 2);

    let mut low: u32 = 0;
    for (i, &b) in first.iter().enumerate() {
        low ^= u32::from(b) << ((i % 4) * 8);
    }

    let mut high: u32 = 0;
    for (i, &b) in second.iter().enumerate() {
        let temp = u32::from(b) << ((i % 4) * 8);
        high = (high ^ temp).rotate_right(temp & 0x1F);
    }

    Ok(u64::from(low) | (u64::from(high) << 32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_directory_hashes() {
        let h = |path: &str| hash_folder(path).unwrap();
        assert_eq!(h("textures/armor/amuletsandrings/elder council"), 0x04BC422C742C696C);
        assert_eq!(h("sound/voice/skyrim.esm/maleuniquedbguardian"), 0x594085AC732B616E);
        assert_eq!(h("textures\\architecture\\windhelm"), 0xC1D97EBE741E6C6D);
    }

    #[test]
    fn validate_file_hashes() {
        let h = |name: &str| hash_file(name).unwrap();
        assert_eq!(h("darkbrotherhood__0007469a_1.fuz"), 0x011F11B0641B5F31);
        assert_eq!(h("elder_council_amulet_n.dds"), 0xDC531E2F6516DFEE);
        assert_eq!(h("testtoddquest_testtoddhappy_00027fa2_1.mp3"), 0xDE0301EE74265F31);
        assert_eq!(h("María_F.fuz"), 0x690E07826D075F66);
    }

    #[test]
    fn extension_magic_bits() {
        assert_eq!(hash_file("x.nif").unwrap(), 0x92CD45FD78018078);
        assert_eq!(hash_file("a.wav").unwrap(), 0x9733CF9EE1010061);
        assert_eq!(hash_file("b.kf").unwrap(), 0x1711E3E9620100E2);
    }

    #[test]
    fn hash_is_case_and_separator_insensitive() {
        assert_eq!(hash_folder("Meshes\\Armor").unwrap(), hash_folder("meshes/armor").unwrap());
        assert_eq!(hash_file("X.NIF").unwrap(), hash_file("x.nif").unwrap());
        assert_eq!(hash_folder("").unwrap(), hash_folder(".").unwrap());
    }

    #[test]
    fn hash_is_pure() {
        let a = calc_hash(b"meshes", b"");
        let b = calc_hash(b"meshes", b"");
        assert_eq!(a, b);
        assert_eq!(a, 0x322F3A9A6D066573);
    }

    #[test]
    fn validate_tes3_hashes() {
        let h = tes3_hash("meshes\\m\\probe_journeyman_01.nif").unwrap();
        assert_eq!(h & 0xFFFF_FFFF, 0x0002_0336);
        assert_eq!(h >> 32, 0xBB50_0695);
        assert_eq!(tes3_hash("textures\\a.dds").unwrap(), 0x429597C6_741D1701);
        assert_eq!(tes3_hash("Textures/A.DDS").unwrap(), tes3_hash("textures\\a.dds").unwrap());
    }

    #[test]
    fn unencodable_names_are_rejected() {
        assert!(matches!(hash_file("铁剑.nif"), Err(BsaError::BadStringEncoding(_))));
    }
}
