// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/bin/nova_worker.rs - 单类别检测工作进程
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

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::info;
use url::Url;

use nova_crops::{
  Category, FromUrl, JobFailure, JobOutcome,
  model::SourceWrapper,
  output::{AssembleError, Assembler, Draw},
  summary::FailureKind,
  task::{AssembleTask, Job, Task},
};

/// 检测工作进程：stdout 只输出一个 JSON 结果对象，日志写入 stderr
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测类别 (eye, palm, nail)
  #[arg(long, value_name = "CATEGORY")]
  pub category: Category,
  /// 预测源 URL（file:// 或 http(s)://）
  #[arg(long, env = "NOVA_PREDICTION_SOURCE", value_name = "SOURCE")]
  pub source: Url,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 输入图像
  #[arg(value_name = "IMAGE")]
  pub image: PathBuf,
  /// 输出目录，默认为 output/<category>
  #[arg(value_name = "OUTPUT_DIR")]
  pub output_dir: Option<PathBuf>,
}

fn run(args: &Args) -> JobOutcome {
  let job = Job::new(
    args.category,
    &args.image,
    args
      .output_dir
      .clone()
      .unwrap_or_else(|| PathBuf::from("output").join(args.category.name())),
  );

  let draw = match &args.font {
    Some(path) => match Draw::with_font_file(path) {
      Ok(draw) => draw,
      Err(e) => {
        return JobOutcome::Failed(JobFailure::new(FailureKind::Precondition, e.to_string()));
      }
    },
    None => Draw::default(),
  };
  let assembler = Assembler::new(draw);

  let source = match SourceWrapper::from_url(&args.source) {
    Ok(source) => source,
    Err(e) => return JobOutcome::Failed(JobFailure::from(&AssembleError::from(e))),
  };

  AssembleTask::new(source, &assembler).run_task(&job)
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  info!("类别: {}", args.category);
  info!("输入图像: {:?}", args.image);
  info!("预测源: {}", args.source.scheme());

  let outcome = run(&args);
  println!("{}", outcome.to_json(args.category));

  if outcome.is_completed() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  }
}
