use std::path::Path;

use log::{debug, warn};
use serde::Serialize;

use super::Archive;
use crate::io::{AssetSink, DefaultAssetSink};
use crate::utils::{destination_for, BsaError};

/// 批量解包结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    /// 已写出的资源路径
    pub extracted: Vec<String>,
    /// 目标已存在且不允许覆盖而跳过的资源
    pub skipped: Vec<String>,
    /// 写出失败的资源及错误信息（文件系统错误，不中断批量操作）
    pub failed: Vec<(String, String)>,
}

impl ExtractReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Archive {
    /// 批量解包与正则表达式匹配的资源
    ///
    /// 资源按内部目录结构写到 `destination` 下。单个资源的文件系统错误会记录后继续，
    /// 解压失败或解析失败说明归档已损坏，立即中止。
    ///
    /// # 参数
    /// * `pattern` - 资源路径正则表达式（不区分大小写）
    /// * `destination` - 输出根目录
    /// * `overwrite` - 为 false 时跳过已存在的文件
    pub fn extract_assets(
        &self,
        pattern: &str,
        destination: &Path,
        overwrite: bool,
    ) -> Result<ExtractReport, BsaError> {
        self.extract_assets_with(pattern, destination, overwrite, &mut DefaultAssetSink)
    }

    /// 使用自定义输出的批量解包
    pub fn extract_assets_with(
        &self,
        pattern: &str,
        destination: &Path,
        overwrite: bool,
        sink: &mut dyn AssetSink,
    ) -> Result<ExtractReport, BsaError> {
        let assets = self.matching_assets(pattern)?;
        let reader = self.payload_reader();
        let mut report = ExtractReport::default();

        for asset in assets {
            let target = destination_for(destination, &asset.path)?;
            if !overwrite && sink.exists(&target) {
                debug!("skipping existing {}", target.display());
                report.skipped.push(asset.path.clone());
                continue;
            }

            // 外部文件读取失败和写出失败一样只影响当前资源
            let written = reader
                .decoded(asset)
                .and_then(|data| sink.write(&target, &data, overwrite));
            match written {
                Ok(()) => report.extracted.push(asset.path.clone()),
                Err(e) if e.is_corruption() => return Err(e),
                Err(BsaError::Filesystem(e)) => {
                    warn!("failed to extract {} to {}: {}", asset.path, target.display(), e);
                    report.failed.push((asset.path.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "extracted {} assets ({} skipped, {} failed)",
            report.extracted.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// 解包单个资源到指定文件
    ///
    /// 目标已存在且不允许覆盖时返回文件系统错误，已有文件保持不变。
    ///
    /// # 参数
    /// * `path` - 资源的内部路径
    /// * `destination` - 输出文件路径
    /// * `overwrite` - 是否覆盖已有文件
    pub fn extract_asset(&self, path: &str, destination: &Path, overwrite: bool) -> Result<(), BsaError> {
        self.extract_asset_with(path, destination, overwrite, &mut DefaultAssetSink)
    }

    /// 使用自定义输出解包单个资源
    pub fn extract_asset_with(
        &self,
        path: &str,
        destination: &Path,
        overwrite: bool,
        sink: &mut dyn AssetSink,
    ) -> Result<(), BsaError> {
        let asset = self.require(path)?;

        if !overwrite && sink.exists(destination) {
            return Err(BsaError::Filesystem(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", destination.display()),
            )));
        }

        let data = self.payload_reader().decoded(asset)?;
        sink.write(destination, &data, overwrite)
    }

    /// 把单个资源解压到内存
    pub fn extract_asset_to_memory(&self, path: &str) -> Result<Vec<u8>, BsaError> {
        let asset = self.require(path)?;
        Ok(self.payload_reader().decoded(asset)?.into_owned())
    }

    /// 资源解压后内容的 CRC-32，不写出文件
    pub fn calc_checksum(&self, path: &str) -> Result<u32, BsaError> {
        let asset = self.require(path)?;
        let data = self.payload_reader().decoded(asset)?;
        Ok(crc32fast::hash(&data))
    }
}
