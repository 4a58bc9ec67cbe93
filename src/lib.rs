pub mod utils;
pub mod datatypes;
pub mod hash;
pub mod compression;
pub mod detect;
pub mod options;
pub mod asset;
pub mod io;
pub mod tes3;
pub mod tes4;
pub mod archive;

// 重新导出主要结构
pub use archive::{Archive, ArchiveStats, ExtractReport};
pub use asset::{Asset, AssetInfo, AssetSource};
pub use datatypes::{ArchiveFlags, ArchiveVersion, Family, FileFlags};
pub use detect::detect;
pub use options::{Compression, SaveFlags, SaveOptions};
pub use utils::{BsaError, ReturnCode};

/// 库版本号 (major, minor, patch)
pub fn version() -> (u32, u32, u32) {
    (
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    )
}

/// 调用方基于的版本是否与当前库兼容
///
/// 主版本号必须相同；0.x 版本还要求次版本号相同。补丁号不影响兼容性。
pub fn is_compatible(major: u32, minor: u32, _patch: u32) -> bool {
    let (current_major, current_minor, _) = version();
    major == current_major && (current_major > 0 || minor == current_minor)
}
