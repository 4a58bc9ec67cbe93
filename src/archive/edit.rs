use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use super::Archive;
use crate::asset::{Asset, AssetSource};
use crate::datatypes::{encode_name, reserve_vec};
use crate::utils::{is_safe_internal_path, normalize_path, BsaError};

/// 校验并规范化待写入的内部路径
fn staged_path(path: &str) -> Result<String, BsaError> {
    let normalized = normalize_path(path);
    if !is_safe_internal_path(&normalized) {
        return Err(BsaError::invalid(format!("invalid asset path: {:?}", path)));
    }
    encode_name(&normalized)?;
    Ok(normalized)
}

/// 外部文件必须存在且是普通文件
fn checked_source(source: &Path) -> Result<PathBuf, BsaError> {
    let metadata = std::fs::metadata(source)?;
    if !metadata.is_file() {
        return Err(BsaError::invalid(format!("{} is not a regular file", source.display())));
    }
    Ok(source.to_path_buf())
}

impl Archive {
    /// 添加外部文件作为新资源
    ///
    /// 只修改内存中的资源列表，保存时才写入归档。路径已存在时返回参数错误。
    ///
    /// # 参数
    /// * `source` - 外部文件
    /// * `path` - 归档内部路径
    pub fn add_asset(&mut self, source: impl AsRef<Path>, path: &str) -> Result<(), BsaError> {
        self.ensure_open()?;
        let path = staged_path(path)?;
        if self.position(&path)?.is_some() {
            return Err(BsaError::invalid(format!("asset already exists: {}", path)));
        }

        let source = checked_source(source.as_ref())?;
        self.assets.push(Asset::new(path, AssetSource::External(source)));
        self.index_asset(self.assets.len() - 1)
    }

    /// 用外部文件替换已有资源的内容（保留原有路径）
    pub fn replace_asset(&mut self, source: impl AsRef<Path>, path: &str) -> Result<(), BsaError> {
        self.ensure_open()?;
        let position = self
            .position(path)?
            .ok_or_else(|| BsaError::invalid(format!("asset not found: {}", path)))?;

        let source = checked_source(source.as_ref())?;
        self.assets[position].source = AssetSource::External(source);
        Ok(())
    }

    /// 移除资源
    pub fn remove_asset(&mut self, path: &str) -> Result<(), BsaError> {
        self.ensure_open()?;
        let position = self
            .position(path)?
            .ok_or_else(|| BsaError::invalid(format!("asset not found: {}", path)))?;

        self.assets.remove(position);
        self.rebuild_index()
    }

    /// 用一组外部文件替换整个资源列表
    ///
    /// 全部校验通过后才替换；重复路径在这里不做处理，保存时只保留第一个。
    ///
    /// # 参数
    /// * `assets` - (外部文件, 内部路径) 列表
    pub fn set_assets(&mut self, assets: Vec<(PathBuf, String)>) -> Result<(), BsaError> {
        self.ensure_open()?;

        let mut staged = reserve_vec(assets.len(), "staged assets")?;
        for (source, path) in assets {
            staged.push(Asset::new(staged_path(&path)?, AssetSource::External(checked_source(&source)?)));
        }

        self.assets = staged;
        self.rebuild_index()
    }

    /// 添加目录下的所有文件
    ///
    /// 内部路径为 `prefix` + 相对路径；已存在的资源会被替换。
    ///
    /// # 返回
    /// 添加或替换的文件数
    pub fn add_directory(&mut self, dir: &Path, prefix: &str) -> Result<usize, BsaError> {
        self.ensure_open()?;
        let mut count = 0;

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| BsaError::invalid(format!("{} is outside {}", entry.path().display(), dir.display())))?;
            let relative = relative
                .to_str()
                .ok_or_else(|| BsaError::BadStringEncoding(relative.display().to_string()))?;
            let internal = if prefix.is_empty() {
                relative.to_string()
            } else {
                format!("{}/{}", prefix, relative)
            };

            if self.has_asset(&internal)? {
                self.replace_asset(entry.path(), &internal)?;
            } else {
                self.add_asset(entry.path(), &internal)?;
            }
            count += 1;
        }

        debug!("staged {} files from {}", count, dir.display());
        Ok(count)
    }
}
