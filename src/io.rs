/// IO 抽象层模块
///
/// 解析和写出逻辑只面向字节流，文件系统相关的操作集中在这里：
/// 解包时资源输出到哪里由 [`AssetSink`] 决定，保存归档时先写入同目录下的临时文件，
/// 完整写出后再原子替换目标文件。
///
/// # 架构设计
///
/// - **traits**: 定义 AssetSink trait 接口
/// - **fs_io**: 基于文件系统的默认实现，以及原子保存用的 StagedFile
///
/// # 使用示例
///
/// ```rust,ignore
/// use bsa_archive::io::{AssetSink, DefaultAssetSink};
///
/// let mut sink = DefaultAssetSink;
/// sink.write(Path::new("out/meshes/a.nif"), &data, false)?;
/// ```
pub mod traits;
pub mod fs_io;

// === 导出 trait 定义 ===
pub use traits::AssetSink;

// === 导出默认实现 ===
pub use fs_io::{DefaultAssetSink, StagedFile};
