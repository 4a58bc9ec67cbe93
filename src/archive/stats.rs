use std::collections::HashSet;

use serde::Serialize;

use super::Archive;
use crate::asset::AssetSource;
use crate::utils::{path_key, split_path};

/// 归档统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStats {
    pub path: String,
    pub version: String,
    pub archive_flags: u32,
    pub file_flags: u32,
    pub asset_count: usize,
    pub folder_count: usize,
    pub compressed_count: usize,
    pub staged_count: usize,
    /// 归档内资源占用的字节数（不含待写入的外部文件）
    pub stored_bytes: u64,
}

impl std::fmt::Display for ArchiveStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== 归档统计信息 ===")?;
        writeln!(f, "路径: {}", self.path)?;
        writeln!(f, "版本: {}", self.version)?;
        writeln!(f, "归档标志: {:#06x}", self.archive_flags)?;
        writeln!(f, "内容标志: {:#06x}", self.file_flags)?;
        writeln!(f, "资源数量: {}", self.asset_count)?;
        writeln!(f, "目录数量: {}", self.folder_count)?;
        writeln!(f, "压缩资源数: {}", self.compressed_count)?;
        writeln!(f, "待写入资源数: {}", self.staged_count)?;
        writeln!(f, "存储字节数: {}", self.stored_bytes)?;
        Ok(())
    }
}

impl Archive {
    /// 获取统计信息
    pub fn get_stats(&self) -> ArchiveStats {
        ArchiveStats {
            path: self.path.display().to_string(),
            version: self.version.to_string(),
            archive_flags: self.archive_flags.bits(),
            file_flags: self.file_flags.bits(),
            asset_count: self.assets.len(),
            folder_count: self.count_folders(),
            compressed_count: self.assets.iter().filter(|a| a.is_compressed()).count(),
            staged_count: self.assets.iter().filter(|a| a.is_staged()).count(),
            stored_bytes: self.stored_bytes(),
        }
    }

    /// 统计不同目录的数量（根目录算一个）
    fn count_folders(&self) -> usize {
        self.assets
            .iter()
            .map(|asset| path_key(split_path(&asset.path).0))
            .collect::<HashSet<_>>()
            .len()
    }

    fn stored_bytes(&self) -> u64 {
        self.assets
            .iter()
            .map(|asset| match asset.source {
                AssetSource::Archive { size, .. } => u64::from(size),
                AssetSource::External(_) => 0,
            })
            .sum()
    }
}
