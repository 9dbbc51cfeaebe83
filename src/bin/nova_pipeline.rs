// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/bin/nova_pipeline.rs - 多类别检测流水线
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use nova_crops::{Category, Orchestrator, PipelineConfig, config::DEFAULT_WORKER_PROGRAM};

/// NOVA 多类别检测流水线参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 眼部 / 下睑结膜图像
  #[arg(long, value_name = "IMAGE")]
  pub eye: Option<PathBuf>,
  /// 手掌图像
  #[arg(long, value_name = "IMAGE")]
  pub palm: Option<PathBuf>,
  /// 指甲图像
  #[arg(long, value_name = "IMAGE")]
  pub nail: Option<PathBuf>,
  /// 输出根目录
  #[arg(long, value_name = "DIR")]
  pub output_root: Option<PathBuf>,
  /// 单个工作进程的超时时间（秒）
  #[arg(long, value_name = "SECONDS")]
  pub timeout: Option<u64>,
  /// 依次运行各类别
  #[arg(long)]
  pub sequential: bool,
  /// 不写入 combined_results.json
  #[arg(long)]
  pub no_combined: bool,
}

/// 未配置工作进程时优先使用与本程序同目录的 nova-worker
fn sibling_worker() -> Option<String> {
  let exe = std::env::current_exe().ok()?;
  let candidate = exe
    .parent()?
    .join(DEFAULT_WORKER_PROGRAM)
    .with_extension(std::env::consts::EXE_EXTENSION);
  candidate
    .is_file()
    .then(|| candidate.to_string_lossy().into_owned())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
  let mut config = match &args.config {
    Some(path) => PipelineConfig::from_file(path)
      .with_context(|| format!("无法加载配置文件: {}", path.display()))?,
    None => PipelineConfig::default(),
  };

  if let Some(root) = &args.output_root {
    config.output_root = root.clone();
  }
  if let Some(timeout) = args.timeout {
    config.timeout_secs = timeout;
  }
  if args.sequential {
    config.concurrent = false;
  }
  if args.no_combined {
    config.combined_report = false;
  }
  if config.worker_program.is_none() {
    config.worker_program = sibling_worker();
  }

  Ok(config)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = load_config(&args)?;

  let images: Vec<(Category, PathBuf)> = [
    (Category::Eye, &args.eye),
    (Category::Palm, &args.palm),
    (Category::Nail, &args.nail),
  ]
  .into_iter()
  .filter_map(|(category, image)| image.clone().map(|image| (category, image)))
  .collect();

  if images.is_empty() {
    bail!("至少需要指定 --eye、--palm、--nail 中的一项");
  }

  info!("输出根目录: {:?}", config.output_root);
  info!("超时时间: {} 秒", config.timeout_secs);

  let orchestrator = Orchestrator::new(config).context("无法初始化流水线")?;
  let report = orchestrator.run_all(
    images
      .into_iter()
      .map(|(category, image)| (category.name(), image)),
  );

  for (name, outcome) in &report.results {
    match outcome.failure() {
      Some(failure) => warn!("{}: 失败 ({:?}) {}", name, failure.kind, failure.message),
      None => info!("{}: 完成", name),
    }
  }

  if orchestrator.config().combined_report {
    let path = orchestrator.write_report(&report)?;
    info!("汇总结果: {:?}", path);
  }

  println!("{}", serde_json::to_string_pretty(&report.to_json())?);
  Ok(())
}
