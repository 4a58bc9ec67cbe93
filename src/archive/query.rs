use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use super::Archive;
use crate::asset::{Asset, AssetInfo};
use crate::utils::{path_key, BsaError};

/// 编译不区分大小写的资源路径匹配表达式
///
/// 编译失败时返回参数错误，错误信息即正则引擎给出的原文。
pub fn compile_pattern(pattern: &str) -> Result<Regex, BsaError> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

impl Archive {
    /// 资源数量（含待写入的外部文件）
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// 全部资源
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// 归档中是否存在指定路径（不区分大小写，`/` 与 `\` 等价）
    pub fn has_asset(&self, path: &str) -> Result<bool, BsaError> {
        Ok(self.position(path)?.is_some())
    }

    /// 按路径查找资源
    pub fn find_asset(&self, path: &str) -> Result<Option<&Asset>, BsaError> {
        Ok(self.position(path)?.map(|position| &self.assets[position]))
    }

    /// 路径与正则表达式匹配的资源
    ///
    /// 表达式不区分大小写，匹配 `/` 分隔的完整内部路径；结果按归档中的顺序排列，
    /// 同一路径只出现一次。没有匹配项时返回空列表。
    ///
    /// # 参数
    /// * `pattern` - 正则表达式，如 `^sound/.*\.wav$`
    pub fn matching_assets(&self, pattern: &str) -> Result<Vec<&Asset>, BsaError> {
        self.ensure_open()?;
        let regex = compile_pattern(pattern)?;

        let mut seen = HashSet::new();
        Ok(self
            .assets
            .iter()
            .filter(|asset| regex.is_match(&asset.path))
            .filter(|asset| seen.insert(path_key(&asset.path)))
            .collect())
    }

    /// 与正则表达式匹配的资源路径
    pub fn get_assets(&self, pattern: &str) -> Result<Vec<String>, BsaError> {
        Ok(self
            .matching_assets(pattern)?
            .into_iter()
            .map(|asset| asset.path.clone())
            .collect())
    }

    /// 与正则表达式匹配的资源摘要（用于列表输出）
    pub fn asset_infos(&self, pattern: &str) -> Result<Vec<AssetInfo>, BsaError> {
        Ok(self
            .matching_assets(pattern)?
            .into_iter()
            .map(Asset::info)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetSource;
    use crate::datatypes::ArchiveVersion;
    use crate::utils::ReturnCode;
    use std::path::PathBuf;

    fn archive_with(paths: &[&str]) -> Archive {
        let mut archive = Archive::create("query.bsa", ArchiveVersion::Tes5);
        for path in paths {
            archive.assets.push(Asset::new(*path, AssetSource::External(PathBuf::from(path))));
        }
        archive.rebuild_index().unwrap();
        archive
    }

    #[test]
    fn test_matching_assets() {
        let archive = archive_with(&["sound/a.wav", "sound/b.mp3", "music/c.wav"]);
        assert_eq!(archive.get_assets(r"^sound/.*\.wav$").unwrap(), vec!["sound/a.wav"]);
        assert_eq!(archive.get_assets(r"\.WAV$").unwrap(), vec!["sound/a.wav", "music/c.wav"]);
        assert!(archive.get_assets("^textures/").unwrap().is_empty());
        assert_eq!(archive.get_assets("").unwrap().len(), 3);
    }

    #[test]
    fn test_duplicate_paths_matched_once() {
        let archive = archive_with(&["meshes/a.nif", "Meshes/A.NIF"]);
        assert_eq!(archive.get_assets("a\\.nif").unwrap(), vec!["meshes/a.nif"]);
    }

    #[test]
    fn test_bad_pattern() {
        let archive = archive_with(&["a.txt"]);
        let err = archive.get_assets("(unclosed").unwrap_err();
        assert_eq!(err.code(), ReturnCode::InvalidArgs);
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn test_has_asset_normalizes() {
        let archive = archive_with(&["meshes/x.nif", "readme.txt"]);
        assert!(archive.has_asset("Meshes\\X.nif").unwrap());
        assert!(archive.has_asset("meshes/x.nif").unwrap());
        assert!(archive.has_asset("/README.TXT").unwrap());
        assert!(!archive.has_asset("meshes/y.nif").unwrap());
        assert!(!archive.has_asset("textures/x.nif").unwrap());
        assert!(matches!(archive.has_asset(""), Err(BsaError::InvalidArguments(_))));
    }

    #[test]
    fn test_has_asset_flat_family() {
        let mut archive = Archive::create("flat.bsa", ArchiveVersion::Tes3);
        archive.assets.push(Asset::new("Textures/A.dds", AssetSource::External(PathBuf::from("a"))));
        archive.rebuild_index().unwrap();

        assert!(archive.has_asset("textures\\a.DDS").unwrap());
        assert!(archive.find_asset("TEXTURES/A.DDS").unwrap().is_some());
    }
}
