mod edit;
mod extract;
mod query;
mod stats;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use memmap2::Mmap;

use crate::asset::{Asset, PayloadReader};
use crate::datatypes::{ArchiveFlags, ArchiveVersion, Family, FileFlags};
use crate::detect::detect;
use crate::hash::{hash_file, hash_folder, tes3_hash};
use crate::io::StagedFile;
use crate::options::SaveOptions;
use crate::utils::{normalize_path, path_key, split_path, BsaError};
use crate::{tes3, tes4};

pub use extract::ExtractReport;
pub use stats::ArchiveStats;

/// 查找键：哈希格式为 (目录哈希, 文件名哈希)，扁平格式为 (名称哈希, 0)
type LookupKey = (u64, u64);

/// BSA 归档句柄
///
/// 打开时解析整个索引，资源内容通过内存映射按需读取。
/// 对资源列表的修改只发生在内存中，[`Archive::save`] 时整体重写归档。
///
/// 句柄不支持并发访问；不同句柄之间互不影响。
#[derive(Debug)]
pub struct Archive {
    /// 归档文件路径
    path: PathBuf,
    version: ArchiveVersion,
    archive_flags: ArchiveFlags,
    file_flags: FileFlags,
    /// 资源列表（打开时为磁盘顺序）
    assets: Vec<Asset>,
    /// 哈希键 -> 资源下标，哈希冲突时再比较路径
    index: HashMap<LookupKey, Vec<usize>>,
    /// 内存映射文件（新建归档没有）
    mmap: Option<Mmap>,
    open: bool,
}

impl Archive {
    /// 打开归档
    ///
    /// 文件不存在或为空时得到一个空的 Skyrim 格式归档，便于从头创建；
    /// 文件存在但无法识别时返回解析错误。
    ///
    /// # 参数
    /// * `path` - 归档路径
    ///
    /// # 示例
    /// ```rust,ignore
    /// let archive = Archive::open("Skyrim - Meshes.bsa")?;
    /// println!("{} assets", archive.asset_count());
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BsaError> {
        let path = path.as_ref();

        match detect(path)? {
            Some(version) => Self::load(path, version),
            None => {
                let is_empty = match std::fs::metadata(path) {
                    Ok(metadata) => metadata.len() == 0,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                    Err(e) => return Err(e.into()),
                };

                if is_empty {
                    debug!("{} does not exist yet, starting an empty archive", path.display());
                    Ok(Self::create(path, ArchiveVersion::Tes5))
                } else {
                    Err(BsaError::parse(format!(
                        "{} is not a supported BSA archive",
                        path.display()
                    )))
                }
            }
        }
    }

    /// 新建空归档（不访问文件系统，保存时才写出）
    pub fn create(path: impl AsRef<Path>, version: ArchiveVersion) -> Self {
        Archive {
            path: path.as_ref().to_path_buf(),
            version,
            archive_flags: ArchiveFlags::empty(),
            file_flags: FileFlags::empty(),
            assets: Vec::new(),
            index: HashMap::new(),
            mmap: None,
            open: true,
        }
    }

    fn load(path: &Path, version: ArchiveVersion) -> Result<Self, BsaError> {
        let mmap = map_file(path)?;

        let (version, archive_flags, file_flags, assets) = match version.family() {
            Family::Flat => (
                ArchiveVersion::Tes3,
                ArchiveFlags::empty(),
                FileFlags::empty(),
                tes3::parse(&mmap)?,
            ),
            Family::Hashed => {
                let (header, assets) = tes4::parse(&mmap)?;
                (header.version, header.archive_flags, header.file_flags, assets)
            }
        };

        let mut archive = Archive {
            path: path.to_path_buf(),
            version,
            archive_flags,
            file_flags,
            assets,
            index: HashMap::new(),
            mmap: Some(mmap),
            open: true,
        };
        archive.rebuild_index()?;

        info!("opened {} ({}, {} assets)", path.display(), version, archive.assets.len());
        Ok(archive)
    }

    /// 关闭句柄，释放内存映射和索引；之后的任何操作都会返回参数错误
    pub fn close(&mut self) {
        self.mmap = None;
        self.assets = Vec::new();
        self.index = HashMap::new();
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// 归档文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> ArchiveVersion {
        self.version
    }

    pub fn family(&self) -> Family {
        self.version.family()
    }

    pub fn archive_flags(&self) -> ArchiveFlags {
        self.archive_flags
    }

    pub fn file_flags(&self) -> FileFlags {
        self.file_flags
    }

    /// 保存归档
    ///
    /// 按当前资源列表完整重写，先写入同目录的临时文件，成功后原子替换目标；
    /// 失败时目标文件保持原样。保存成功后句柄指向新文件。
    ///
    /// # 参数
    /// * `path` - 目标路径（可以是当前归档自身）
    /// * `options` - 目标版本与压缩策略
    pub fn save(&mut self, path: impl AsRef<Path>, options: SaveOptions) -> Result<(), BsaError> {
        self.ensure_open()?;
        options.flags()?;
        let path = path.as_ref();

        let mut staged = StagedFile::create(path)?;
        {
            let assets = self.unique_assets();
            let reader = self.payload_reader();
            let mut out = BufWriter::new(staged.file_mut());

            match options.version.family() {
                Family::Flat => {
                    tes3::write(&mut out, &assets, &reader)?;
                }
                Family::Hashed => {
                    let params = tes4::WriteParams {
                        version: options.version,
                        archive_flags: self.archive_flags,
                        file_flags: self.resolved_file_flags(&assets),
                        compression: options.compression,
                    };
                    tes4::write(&mut out, &assets, &reader, &params)?;
                }
            }

            out.flush()?;
        }

        // 替换前释放映射（Windows 不允许替换仍被映射的文件）
        let had_mapping = self.mmap.take().is_some();
        if let Err(e) = staged.commit() {
            if had_mapping {
                match map_file(&self.path) {
                    Ok(mmap) => self.mmap = Some(mmap),
                    Err(_) => self.close(),
                }
            }
            return Err(e);
        }

        let reloaded = detect(path).and_then(|version| match version {
            Some(version) => Self::load(path, version),
            None => Err(BsaError::parse(format!("saved archive {} cannot be detected", path.display()))),
        });
        match reloaded {
            Ok(archive) => *self = archive,
            Err(e) => {
                self.close();
                return Err(e);
            }
        }

        info!("saved {} ({})", path.display(), options);
        Ok(())
    }

    /// 以原始标志字保存（标志无效时在任何文件操作之前返回参数错误）
    pub fn save_with_flags(&mut self, path: impl AsRef<Path>, flags: u32) -> Result<(), BsaError> {
        let options = SaveOptions::from_bits(flags)?;
        self.save(path, options)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), BsaError> {
        if self.open {
            Ok(())
        } else {
            Err(BsaError::invalid("archive handle is closed"))
        }
    }

    pub(crate) fn payload_reader(&self) -> PayloadReader<'_> {
        match &self.mmap {
            Some(mmap) => PayloadReader::new(&mmap[..]),
            None => PayloadReader::empty(),
        }
    }

    /// 去掉重复路径（保留第一个）
    fn unique_assets(&self) -> Vec<&Asset> {
        let mut seen = std::collections::HashSet::new();
        self.assets
            .iter()
            .filter(|asset| {
                let fresh = seen.insert(path_key(&asset.path));
                if !fresh {
                    warn!("duplicate asset path {:?} dropped on save", asset.path);
                }
                fresh
            })
            .collect()
    }

    /// 沿用打开时的内容类型标志，没有时按资源路径推断
    fn resolved_file_flags(&self, assets: &[&Asset]) -> FileFlags {
        if !self.file_flags.is_empty() {
            return self.file_flags;
        }
        assets
            .iter()
            .fold(FileFlags::empty(), |flags, asset| flags | FileFlags::for_path(&asset.path))
    }

    fn lookup_key(&self, normalized: &str) -> Result<LookupKey, BsaError> {
        match self.family() {
            Family::Flat => Ok((tes3_hash(normalized)?, 0)),
            Family::Hashed => {
                let (dir, file) = split_path(normalized);
                Ok((hash_folder(dir)?, hash_file(file)?))
            }
        }
    }

    pub(crate) fn rebuild_index(&mut self) -> Result<(), BsaError> {
        let mut index: HashMap<LookupKey, Vec<usize>> = HashMap::new();
        index
            .try_reserve(self.assets.len())
            .map_err(|_| BsaError::OutOfMemory("cannot allocate the asset index".to_string()))?;

        for (position, asset) in self.assets.iter().enumerate() {
            index.entry(self.lookup_key(&asset.path)?).or_default().push(position);
        }

        self.index = index;
        Ok(())
    }

    pub(crate) fn index_asset(&mut self, position: usize) -> Result<(), BsaError> {
        let key = self.lookup_key(&self.assets[position].path)?;
        self.index.entry(key).or_default().push(position);
        Ok(())
    }

    /// 按路径查找资源下标（不区分大小写，`/` 与 `\` 等价）
    pub(crate) fn position(&self, path: &str) -> Result<Option<usize>, BsaError> {
        self.ensure_open()?;

        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return Err(BsaError::invalid("empty asset path"));
        }

        let key = self.lookup_key(&normalized)?;
        let wanted = normalized.to_lowercase();
        Ok(self.index.get(&key).and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .find(|&i| self.assets[i].path.to_lowercase() == wanted)
        }))
    }

    /// 按路径查找资源，不存在时返回参数错误
    pub(crate) fn require(&self, path: &str) -> Result<&Asset, BsaError> {
        match self.position(path)? {
            Some(position) => Ok(&self.assets[position]),
            None => Err(BsaError::invalid(format!("asset not found: {}", path))),
        }
    }
}

fn map_file(path: &Path) -> Result<Mmap, BsaError> {
    let file = File::open(path)?;
    // 使用内存映射文件（零拷贝访问资源数据）
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}
