// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/orchestrator.rs - 多类别任务编排
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

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  thread,
};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  FromUrl,
  category::{Category, InvalidCategory},
  config::{Execution, PipelineConfig},
  model::SourceWrapper,
  output::{AssembleError, Assembler, Draw, DrawError},
  runner::JobRunner,
  summary::{FailureKind, JobFailure, JobOutcome},
  task::{AssembleTask, Job, Task, WorkerTask},
};

#[derive(Error, Debug)]
pub enum OrchestratorError {
  #[error(transparent)]
  InvalidCategory(#[from] InvalidCategory),
  #[error("字体加载失败: {0}")]
  FontError(#[from] DrawError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 各类别任务结果的汇总，键为类别名
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedReport {
  pub generated_at: DateTime<Utc>,
  pub results: BTreeMap<String, JobOutcome>,
}

impl CombinedReport {
  pub fn get(&self, category: Category) -> Option<&JobOutcome> {
    self.results.get(category.name())
  }

  pub fn to_json(&self) -> Value {
    let results: Map<String, Value> = self
      .results
      .iter()
      .map(|(name, outcome)| {
        let value = match (name.parse::<Category>(), outcome) {
          (Ok(category), outcome) => outcome.to_json(category),
          (Err(_), JobOutcome::Failed(failure)) => failure.to_json(),
          (Err(_), JobOutcome::Completed(_)) => {
            JobFailure::new(FailureKind::Precondition, format!("未知的检测类别: {}", name))
              .to_json()
          }
        };
        (name.clone(), value)
      })
      .collect();

    json!({
      "generated_at": self.generated_at.to_rfc3339(),
      "results": results,
    })
  }
}

pub struct Orchestrator {
  config: PipelineConfig,
  runner: JobRunner,
  assembler: Assembler,
}

impl Orchestrator {
  pub fn new(config: PipelineConfig) -> Result<Self, OrchestratorError> {
    let draw = match &config.font {
      Some(path) => Draw::with_font_file(path)?,
      None => Draw::default(),
    };
    Ok(Self::with_assembler(config, Assembler::new(draw)))
  }

  pub fn with_assembler(config: PipelineConfig, assembler: Assembler) -> Self {
    Self {
      config,
      runner: JobRunner,
      assembler,
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 运行单个类别；未知类别立即返回错误，不会启动任何工作进程
  pub fn run_category(&self, category: &str, image: &Path) -> Result<JobOutcome, OrchestratorError> {
    let category: Category = category.parse()?;
    Ok(self.run_job(category, image))
  }

  pub fn run_job(&self, category: Category, image: &Path) -> JobOutcome {
    let job = Job::new(category, image, self.config.output_dir(category));
    info!("开始 {} 任务: {:?} -> {:?}", category, job.image, job.output_dir);

    if !job.image.is_file() {
      warn!("{} 输入图像不存在: {:?}", category, job.image);
      return JobOutcome::Failed(JobFailure::new(
        FailureKind::Precondition,
        format!("输入图像不存在: {}", job.image.display()),
      ));
    }

    let execution = match self.config.execution(category) {
      Ok(execution) => execution,
      Err(e) => return JobOutcome::Failed(JobFailure::new(FailureKind::Precondition, e.to_string())),
    };

    match execution {
      Execution::Worker { spec, timeout } => {
        WorkerTask::new(&self.runner, &spec, timeout).run_task(&job)
      }
      Execution::InProcess { source } => match SourceWrapper::from_url(&source) {
        Ok(source) => AssembleTask::new(source, &self.assembler).run_task(&job),
        Err(e) => JobOutcome::Failed(JobFailure::from(&AssembleError::from(e))),
      },
    }
  }

  /// 运行多个类别，任一类别失败都不影响其它类别。
  /// 输出目录与已排队类别相同的类别记为前置条件失败，不会运行。
  pub fn run_all<I, K>(&self, images: I) -> CombinedReport
  where
    I: IntoIterator<Item = (K, PathBuf)>,
    K: AsRef<str>,
  {
    let mut results: BTreeMap<String, JobOutcome> = BTreeMap::new();
    let mut jobs: Vec<(Category, PathBuf)> = Vec::new();

    for (name, image) in images {
      let name = name.as_ref();
      match name.parse::<Category>() {
        Ok(category)
          if jobs.iter().any(|(c, _)| *c == category)
            || results.contains_key(category.name()) =>
        {
          // 同一类别共享输出目录，只允许一个任务
          warn!("重复的类别 {}，忽略 {:?}", category, image);
        }
        Ok(category) => {
          let output_dir = self.config.output_dir(category);
          let owner = jobs
            .iter()
            .map(|(c, _)| *c)
            .find(|c| self.config.output_dir(*c) == output_dir);
          match owner {
            Some(owner) => {
              let message = format!(
                "{} 与 {} 使用同一输出目录 {}",
                category,
                owner,
                output_dir.display()
              );
              warn!("{}", message);
              results.insert(
                category.name().to_string(),
                JobOutcome::Failed(JobFailure::new(FailureKind::Precondition, message)),
              );
            }
            None => jobs.push((category, image)),
          }
        }
        Err(e) => {
          warn!("{}", e);
          results.insert(
            name.to_string(),
            JobOutcome::Failed(JobFailure::new(FailureKind::Precondition, e.to_string())),
          );
        }
      }
    }

    let outcomes: Vec<(Category, JobOutcome)> = if self.config.concurrent && jobs.len() > 1 {
      thread::scope(|scope| {
        let handles: Vec<_> = jobs
          .iter()
          .map(|(category, image)| {
            let category = *category;
            (category, scope.spawn(move || self.run_job(category, image)))
          })
          .collect();

        handles
          .into_iter()
          .map(|(category, handle)| {
            let outcome = handle.join().unwrap_or_else(|_| {
              JobOutcome::Failed(JobFailure::new(FailureKind::Io, "任务线程异常退出"))
            });
            (category, outcome)
          })
          .collect()
      })
    } else {
      jobs
        .iter()
        .map(|(category, image)| (*category, self.run_job(*category, image)))
        .collect()
    };

    for (category, outcome) in outcomes {
      results.insert(category.name().to_string(), outcome);
    }

    CombinedReport {
      generated_at: Utc::now(),
      results,
    }
  }

  /// 把汇总写入输出根目录下的 `combined_results.json`
  pub fn write_report(&self, report: &CombinedReport) -> Result<PathBuf, OrchestratorError> {
    std::fs::create_dir_all(&self.config.output_root)?;
    let path = self.config.combined_report_path();
    let text = serde_json::to_string_pretty(&report.to_json())?;
    std::fs::write(&path, text)?;
    info!("汇总结果已写入 {:?}", path);
    Ok(path)
  }
}
