use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use bsa_archive::{Archive, ArchiveVersion, BsaError, Compression, SaveOptions};

#[derive(Parser)]
#[command(name = "bsa_archive")]
#[command(about = "读取、解包和打包 Bethesda BSA 归档（Morrowind / Oblivion / Skyrim / Fallout 3 / New Vegas）")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 静默模式(仅输出错误)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// 列出归档中的资源
    List {
        archive: PathBuf,
        /// 资源路径正则表达式（不区分大小写）
        #[arg(short, long, default_value = ".*")]
        pattern: String,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 显示归档统计信息
    Info {
        archive: PathBuf,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 批量解包匹配的资源
    Extract {
        archive: PathBuf,
        /// 输出目录
        destination: PathBuf,
        /// 资源路径正则表达式（不区分大小写）
        #[arg(short, long, default_value = ".*")]
        pattern: String,
        /// 覆盖已存在的文件
        #[arg(long)]
        overwrite: bool,
    },
    /// 解包单个资源
    ExtractOne {
        archive: PathBuf,
        /// 资源的内部路径
        asset: String,
        /// 输出文件路径
        destination: PathBuf,
        /// 覆盖已存在的文件
        #[arg(long)]
        overwrite: bool,
    },
    /// 把目录打包为新归档
    Pack {
        /// 源目录（其下的相对路径即内部路径）
        source: PathBuf,
        /// 输出归档
        output: PathBuf,
        /// 归档版本
        #[arg(long, value_enum, default_value_t = GameVersion::Tes5)]
        format: GameVersion,
        /// 压缩级别 0-9（0 表示不压缩）
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
        /// 内部路径前缀
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// 重写归档（可转换版本或调整压缩）
    Rebuild {
        archive: PathBuf,
        /// 输出路径（默认原地重写）
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 目标版本（默认保持不变）
        #[arg(long, value_enum)]
        format: Option<GameVersion>,
        /// 压缩级别 0-9（默认保持每个文件原有的压缩状态）
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: Option<u32>,
        /// 重写前创建备份
        #[arg(long)]
        backup: bool,
    },
    /// 计算资源内容的 CRC-32
    Checksum {
        archive: PathBuf,
        /// 资源的内部路径
        asset: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GameVersion {
    /// Morrowind
    Tes3,
    /// Oblivion
    Tes4,
    /// Skyrim / Fallout 3 / New Vegas
    Tes5,
}

impl From<GameVersion> for ArchiveVersion {
    fn from(version: GameVersion) -> Self {
        match version {
            GameVersion::Tes3 => ArchiveVersion::Tes3,
            GameVersion::Tes4 => ArchiveVersion::Tes4,
            GameVersion::Tes5 => ArchiveVersion::Tes5,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("错误: {:#}", e);
            // 库错误按返回码退出，其他错误统一为 1
            let code = e
                .downcast_ref::<BsaError>()
                .map(|error| error.code().as_u32())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

/// 初始化日志（RUST_LOG 优先）
fn init_logger(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::List { archive, pattern, json } => handle_list(archive, pattern, *json),
        Command::Info { archive, json } => handle_info(archive, *json),
        Command::Extract { archive, destination, pattern, overwrite } => {
            handle_extract(cli, archive, destination, pattern, *overwrite)
        }
        Command::ExtractOne { archive, asset, destination, overwrite } => {
            handle_extract_one(cli, archive, asset, destination, *overwrite)
        }
        Command::Pack { source, output, format, level, prefix } => {
            handle_pack(cli, source, output, (*format).into(), *level, prefix)
        }
        Command::Rebuild { archive, output, format, level, backup } => {
            handle_rebuild(cli, archive, output.as_deref(), format.map(Into::into), *level, *backup)
        }
        Command::Checksum { archive, asset } => handle_checksum(archive, asset),
    }
}

/// 打开已有归档（不存在时报错，而不是当作新建）
fn open_existing(path: &Path) -> Result<Archive> {
    if !path.is_file() {
        bail!("归档文件不存在: {:?}", path);
    }
    Archive::open(path).with_context(|| format!("打开归档失败: {:?}", path))
}

/// 列出资源
fn handle_list(path: &Path, pattern: &str, json: bool) -> Result<()> {
    let archive = open_existing(path)?;

    if json {
        let infos = archive.asset_infos(pattern)?;
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        for asset in archive.get_assets(pattern)? {
            println!("{}", asset);
        }
    }

    Ok(())
}

/// 显示统计信息
fn handle_info(path: &Path, json: bool) -> Result<()> {
    let archive = open_existing(path)?;
    let stats = archive.get_stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", stats);
    }

    Ok(())
}

/// 批量解包
fn handle_extract(cli: &Cli, path: &Path, destination: &Path, pattern: &str, overwrite: bool) -> Result<()> {
    let archive = open_existing(path)?;
    let report = archive
        .extract_assets(pattern, destination, overwrite)
        .with_context(|| format!("解包失败: {:?}", path))?;

    if !cli.quiet {
        println!("已解包 {} 个资源到 {:?}", report.extracted.len(), destination);
        if !report.skipped.is_empty() {
            println!("跳过 {} 个已存在的文件（使用 --overwrite 覆盖）", report.skipped.len());
        }
    }
    for (asset, error) in &report.failed {
        eprintln!("解包失败: {} ({})", asset, error);
    }

    if !report.is_complete() {
        bail!("{} 个资源解包失败", report.failed.len());
    }
    Ok(())
}

/// 解包单个资源
fn handle_extract_one(cli: &Cli, path: &Path, asset: &str, destination: &Path, overwrite: bool) -> Result<()> {
    let archive = open_existing(path)?;
    archive
        .extract_asset(asset, destination, overwrite)
        .with_context(|| format!("解包 {} 失败", asset))?;

    if !cli.quiet {
        println!("已解包 {} -> {:?}", asset, destination);
    }
    Ok(())
}

/// 打包目录
fn handle_pack(
    cli: &Cli,
    source: &Path,
    output: &Path,
    version: ArchiveVersion,
    level: u32,
    prefix: &str,
) -> Result<()> {
    if !source.is_dir() {
        bail!("源目录不存在: {:?}", source);
    }

    let compression = match level {
        0 => Compression::None,
        level => Compression::Level(level),
    };
    let options = SaveOptions::new(version, compression)?;

    let mut archive = Archive::create(output, version);
    let count = archive.add_directory(source, prefix)?;
    archive
        .save(output, options)
        .with_context(|| format!("写出归档失败: {:?}", output))?;

    if !cli.quiet {
        println!("已打包 {} 个文件到 {:?} ({})", count, output, options);
    }
    Ok(())
}

/// 重写归档
fn handle_rebuild(
    cli: &Cli,
    path: &Path,
    output: Option<&Path>,
    version: Option<ArchiveVersion>,
    level: Option<u32>,
    backup: bool,
) -> Result<()> {
    let mut archive = open_existing(path)?;
    let version = version.unwrap_or(archive.version());
    let options = SaveOptions::new(version, rebuild_compression(version, level))?;

    let output = output.unwrap_or(path);
    if backup && output.exists() {
        let backup_path = bsa_archive::utils::create_backup(output)?;
        if !cli.quiet {
            println!("已创建备份文件: {:?}", backup_path);
        }
    }

    archive
        .save(output, options)
        .with_context(|| format!("重写归档失败: {:?}", output))?;

    if !cli.quiet {
        println!("重写完成，输出到: {:?} ({})", output, options);
    }
    Ok(())
}

/// 重写时的压缩策略
///
/// 未指定级别时保持各资源原有状态；Morrowind 格式不支持压缩，只能不压缩。
fn rebuild_compression(version: ArchiveVersion, level: Option<u32>) -> Compression {
    match level {
        None if !version.supports_compression() => Compression::None,
        None => Compression::NoChange,
        Some(0) => Compression::None,
        Some(level) => Compression::Level(level),
    }
}

/// 计算校验值
fn handle_checksum(path: &Path, asset: &str) -> Result<()> {
    let archive = open_existing(path)?;
    let checksum = archive.calc_checksum(asset)?;
    println!("{:08x}  {}", checksum, asset);
    Ok(())
}
