// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/model/file_source.rs - 本地 JSON 文件预测源
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

use std::path::{Path, PathBuf};

use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Prediction, PredictionSource, PredictionSourceError, parse_predictions},
};

/// 从磁盘上的 JSON 文档读取预测，离线运行与测试时使用
#[derive(Debug, Clone)]
pub struct FileSource {
  path: PathBuf,
}

impl FileSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl FromUrlWithScheme for FileSource {
  const SCHEME: &'static str = "file";
}

impl FromUrl for FileSource {
  type Error = PredictionSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(PredictionSourceError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url
      .to_file_path()
      .map_err(|_| PredictionSourceError::SchemeMismatch(format!("无效的文件路径: {}", url)))?;
    Ok(FileSource { path })
  }
}

impl PredictionSource for FileSource {
  fn predict(&self, image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
    debug!("读取预测文件 {:?} (图像 {:?})", self.path, image);
    let text = std::fs::read_to_string(&self.path).map_err(|e| {
      PredictionSourceError::Unreachable(format!("{}: {}", self.path.display(), e))
    })?;
    let value = serde_json::from_str(&text)
      .map_err(|e| PredictionSourceError::Malformed(e.to_string()))?;
    parse_predictions(&value)
  }
}
