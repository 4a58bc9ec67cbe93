/// IO 抽象层 - trait 定义
///
/// 解包引擎通过该接口输出资源，支持依赖注入和测试 mock。

use std::path::Path;
use crate::utils::BsaError;

/// 资源输出 trait
///
/// # 职责
/// - 把解压后的资源内容写到目标位置
/// - 不负责路径计算和解压，仅负责 IO
///
/// # 实现示例
/// ```rust,ignore
/// #[derive(Default)]
/// pub struct MemorySink(HashMap<PathBuf, Vec<u8>>);
/// impl AssetSink for MemorySink {
///     fn exists(&self, destination: &Path) -> bool {
///         self.0.contains_key(destination)
///     }
///     fn write(&mut self, destination: &Path, data: &[u8], _overwrite: bool) -> Result<(), BsaError> {
///         self.0.insert(destination.to_path_buf(), data.to_vec());
///         Ok(())
///     }
/// }
/// ```
pub trait AssetSink {
    /// 目标位置是否已存在
    fn exists(&self, destination: &Path) -> bool;

    /// 写入资源内容
    ///
    /// # 参数
    /// * `destination` - 目标路径
    /// * `data` - 解压后的内容
    /// * `overwrite` - 为 false 时目标已存在必须返回错误，且不得修改已有内容
    fn write(&mut self, destination: &Path, data: &[u8], overwrite: bool) -> Result<(), BsaError>;
}
