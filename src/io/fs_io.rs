/// 文件系统 IO 实现
///
/// 提供资源输出的默认实现，以及保存归档时使用的原子替换
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use super::traits::AssetSink;
use crate::utils::BsaError;

/// 默认的资源输出（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultAssetSink;

impl AssetSink for DefaultAssetSink {
    fn exists(&self, destination: &Path) -> bool {
        destination.exists()
    }

    fn write(&mut self, destination: &Path, data: &[u8], overwrite: bool) -> Result<(), BsaError> {
        // 确保父目录存在
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // 不覆盖时用 create_new，由文件系统保证已有文件不被改动
        let mut file = if overwrite {
            File::create(destination)?
        } else {
            OpenOptions::new().write(true).create_new(true).open(destination)?
        };

        file.write_all(data)?;
        Ok(())
    }
}

/// 暂存文件：写入目标同目录下的临时文件，提交时原子替换目标
///
/// 未提交就被丢弃时临时文件会被删除，目标文件保持原样。
pub struct StagedFile {
    target: PathBuf,
    temp: NamedTempFile,
}

impl StagedFile {
    /// 在目标文件所在目录创建临时文件
    pub fn create(target: &Path) -> Result<Self, BsaError> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(dir)?;
        debug!("staging {} in {}", target.display(), temp.path().display());

        Ok(StagedFile {
            target: target.to_path_buf(),
            temp,
        })
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// 落盘并替换目标文件
    pub fn commit(self) -> Result<(), BsaError> {
        self.temp.as_file().sync_all()?;
        self.temp.persist(&self.target).map_err(|e| e.error)?;
        debug!("replaced {}", self.target.display());
        Ok(())
    }
}
