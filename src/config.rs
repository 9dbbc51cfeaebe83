// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/config.rs - 流水线配置
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
  time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{category::Category, runner::WorkerSpec};

pub const DEFAULT_WORKER_PROGRAM: &str = "nova-worker";
pub const COMBINED_REPORT_FILE: &str = "combined_results.json";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("{0} 类别使用进程内模式但未配置 source")]
  MissingSource(Category),
  #[error("{0} 类别的 source 不是有效 URL: {1}")]
  InvalidSource(Category, url::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
  #[default]
  Worker,
  InProcess,
}

/// 单个类别的配置，未填写的字段使用默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
  pub subdir: Option<String>,
  pub mode: ExecutionMode,
  pub program: Option<String>,
  pub args: Option<Vec<String>>,
  pub source: Option<String>,
  pub timeout_secs: Option<u64>,
}

/// 类别解析后的执行方式
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
  Worker { spec: WorkerSpec, timeout: Duration },
  InProcess { source: Url },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub output_root: PathBuf,
  pub timeout_secs: u64,
  pub concurrent: bool,
  pub combined_report: bool,
  pub font: Option<PathBuf>,
  pub worker_program: Option<String>,
  pub categories: BTreeMap<Category, CategoryConfig>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      output_root: PathBuf::from("output"),
      timeout_secs: 120,
      concurrent: true,
      combined_report: true,
      font: None,
      worker_program: None,
      categories: BTreeMap::new(),
    }
  }
}

impl PipelineConfig {
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Self::from_toml(&text)
  }

  pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(text)?)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn category(&self, category: Category) -> CategoryConfig {
    self.categories.get(&category).cloned().unwrap_or_default()
  }

  pub fn output_dir(&self, category: Category) -> PathBuf {
    let config = self.category(category);
    let subdir = config.subdir.as_deref().unwrap_or(category.name());
    self.output_root.join(subdir)
  }

  pub fn combined_report_path(&self) -> PathBuf {
    self.output_root.join(COMBINED_REPORT_FILE)
  }

  pub fn execution(&self, category: Category) -> Result<Execution, ConfigError> {
    let config = self.category(category);
    match config.mode {
      ExecutionMode::Worker => {
        let program = config
          .program
          .or_else(|| self.worker_program.clone())
          .unwrap_or_else(|| DEFAULT_WORKER_PROGRAM.to_string());
        let args = config.args.unwrap_or_else(|| {
          vec!["--category".to_string(), category.name().to_string()]
        });
        let timeout = config
          .timeout_secs
          .map(Duration::from_secs)
          .unwrap_or_else(|| self.timeout());
        Ok(Execution::Worker {
          spec: WorkerSpec::new(program).with_args(args),
          timeout,
        })
      }
      ExecutionMode::InProcess => {
        let source = config.source.ok_or(ConfigError::MissingSource(category))?;
        let source =
          Url::parse(&source).map_err(|e| ConfigError::InvalidSource(category, e))?;
        Ok(Execution::InProcess { source })
      }
    }
  }
}
