//! 用 ba2 读取本库写出的归档，交叉验证目录结构、哈希与压缩数据

use ba2::prelude::*;
use ba2::tes4::{Archive as Ba2Archive, ArchiveKey, DirectoryKey, FileCompressionOptions};
use bsa_archive::{Archive, ArchiveVersion, Compression, SaveOptions};
use std::path::Path;

const CONTENT: &[(&str, &[u8])] = &[
    ("meshes/armor/iron/cuirass.nif", b"NetImmerse File Format, Version 20.2.0.7"),
    ("meshes/armor/iron/helmet.nif", b"helmet helmet helmet helmet helmet"),
    ("textures/armor/iron/cuirass.dds", b"DDS |....................................."),
    ("Sound/FX/Hit.WAV", b"RIFF\x24\x00\x00\x00WAVEfmt "),
];

/// 写出一个包含 [`CONTENT`] 的归档
fn write_archive(dir: &Path, version: ArchiveVersion, compression: Compression) -> std::path::PathBuf {
    let path = dir.join("interop.bsa");
    let mut archive = Archive::create(&path, version);

    for (i, (name, data)) in CONTENT.iter().enumerate() {
        let source = dir.join(format!("source_{}", i));
        std::fs::write(&source, data).unwrap();
        archive.add_asset(&source, name).unwrap();
    }

    archive
        .save(&path, SaveOptions::new(version, compression).unwrap())
        .unwrap();
    path
}

/// 用 ba2 读出全部文件：(小写、`/` 分隔的路径, 解压后的内容)
fn read_with_ba2(path: &Path) -> Vec<(String, Vec<u8>)> {
    let (archive, meta) = Ba2Archive::read(path).unwrap();
    let options: FileCompressionOptions = meta.into();
    let mut files = Vec::new();

    for (dir_key, directory) in &archive {
        let dir_name = String::from_utf8_lossy(dir_key.name()).to_string();
        for (file_key, file) in directory {
            let file_name = String::from_utf8_lossy(file_key.name()).to_string();
            let mut buffer = Vec::new();
            file.write(&mut buffer, &options).unwrap();
            files.push((format!("{}/{}", dir_name, file_name).replace('\\', "/").to_lowercase(), buffer));
        }
    }

    files.sort();
    files
}

fn expected() -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = CONTENT
        .iter()
        .map(|(name, data)| (name.to_lowercase(), data.to_vec()))
        .collect();
    files.sort();
    files
}

#[test]
fn test_ba2_reads_uncompressed_tes4() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_archive(dir.path(), ArchiveVersion::Tes4, Compression::None);

    assert_eq!(read_with_ba2(&path), expected());
}

#[test]
fn test_ba2_reads_compressed_tes5() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_archive(dir.path(), ArchiveVersion::Tes5, Compression::Level(9));

    assert_eq!(read_with_ba2(&path), expected());
}

#[test]
fn test_ba2_lookup_by_hash_key() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_archive(dir.path(), ArchiveVersion::Tes5, Compression::Level(6));

    // ba2 按自己算出的哈希查找，能找到说明两边哈希一致
    let (archive, meta) = Ba2Archive::read(path.as_path()).unwrap();
    let directory = archive
        .get(&ArchiveKey::from(&b"meshes\\armor\\iron"[..]))
        .expect("folder hash should match");
    let file = directory
        .get(&DirectoryKey::from(&b"helmet.nif"[..]))
        .expect("file hash should match");

    let options: FileCompressionOptions = meta.into();
    let mut buffer = Vec::new();
    file.write(&mut buffer, &options).unwrap();
    assert_eq!(buffer, b"helmet helmet helmet helmet helmet");
}

#[test]
fn test_we_read_back_what_ba2_sees() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = write_archive(dir.path(), ArchiveVersion::Tes4, Compression::Level(1));
    let archive = Archive::open(&path).unwrap();

    for (name, data) in read_with_ba2(&path) {
        assert_eq!(archive.extract_asset_to_memory(&name).unwrap(), data, "{}", name);
    }
}
