// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/model.rs - 预测结果与预测源
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(feature = "remote_source")]
use crate::FromUrlWithScheme;

/// 单个检测结果，`(x, y)` 为框中心的像素坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
  #[serde(rename = "class")]
  pub class_name: String,
  #[serde(default = "full_confidence")]
  pub confidence: f32,
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

fn full_confidence() -> f32 {
  1.0
}

/// 角点形式的框，保持浮点，仅在像素索引处取整
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
  pub x0: f32,
  pub y0: f32,
  pub x1: f32,
  pub y1: f32,
}

impl Prediction {
  pub fn corners(&self) -> Corners {
    let (half_w, half_h) = (self.width / 2.0, self.height / 2.0);
    Corners {
      x0: self.x - half_w,
      y0: self.y - half_h,
      x1: self.x + half_w,
      y1: self.y + half_h,
    }
  }

  pub fn label(&self) -> String {
    format!("{} {:.1}%", self.class_name, self.confidence * 100.0)
  }
}

/// 裁剪用的整数像素区域 `[left, right) x [top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
  pub left: u32,
  pub top: u32,
  pub right: u32,
  pub bottom: u32,
}

impl PixelRegion {
  pub fn width(&self) -> u32 {
    self.right - self.left
  }

  pub fn height(&self) -> u32 {
    self.bottom - self.top
  }
}

impl Corners {
  /// 向外取整后裁到图像范围内；面积为零时返回 `None`
  pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRegion> {
    let (w, h) = (width as f32, height as f32);
    let left = self.x0.floor().clamp(0.0, w) as u32;
    let top = self.y0.floor().clamp(0.0, h) as u32;
    let right = self.x1.ceil().clamp(0.0, w) as u32;
    let bottom = self.y1.ceil().clamp(0.0, h) as u32;

    if left >= right || top >= bottom {
      return None;
    }

    Some(PixelRegion {
      left,
      top,
      right,
      bottom,
    })
  }
}

#[derive(Error, Debug)]
pub enum PredictionSourceError {
  #[error("预测源不可达: {0}")]
  Unreachable(String),
  #[error("预测源返回了错误: {0}")]
  Service(String),
  #[error("预测结果格式错误: {0}")]
  Malformed(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 外部检测能力：给定图像，返回零个或多个预测
pub trait PredictionSource {
  fn predict(&self, image: &Path) -> Result<Vec<Prediction>, PredictionSourceError>;
}

impl<S: PredictionSource + ?Sized> PredictionSource for &S {
  fn predict(&self, image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
    (**self).predict(image)
  }
}

impl<S: PredictionSource + ?Sized> PredictionSource for Box<S> {
  fn predict(&self, image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
    (**self).predict(image)
  }
}

/// 解析上游返回的 JSON，兼容三种形状：
/// 裸数组、`{"predictions": [...]}`、`[{"predictions": {"predictions": [...]}}]`
pub fn parse_predictions(value: &Value) -> Result<Vec<Prediction>, PredictionSourceError> {
  let list = locate_prediction_list(value).ok_or_else(|| {
    PredictionSourceError::Malformed("未找到 predictions 列表".to_string())
  })?;

  let predictions: Vec<Prediction> = serde_json::from_value(list.clone())
    .map_err(|e| PredictionSourceError::Malformed(e.to_string()))?;

  if let Some(bad) = predictions
    .iter()
    .find(|p| !(p.width >= 0.0 && p.height >= 0.0))
  {
    return Err(PredictionSourceError::Malformed(format!(
      "框尺寸为负: {} ({} x {})",
      bad.class_name, bad.width, bad.height
    )));
  }

  Ok(predictions)
}

fn locate_prediction_list(value: &Value) -> Option<&Value> {
  match value {
    Value::Array(items) => match items.first() {
      Some(Value::Object(first)) if !first.contains_key("class") => {
        first.get("predictions").and_then(locate_prediction_list)
      }
      _ => Some(value),
    },
    Value::Object(object) => object.get("predictions").and_then(locate_prediction_list),
    _ => None,
  }
}

mod file_source;
pub use self::file_source::FileSource;

#[cfg(feature = "remote_source")]
mod http_source;
#[cfg(feature = "remote_source")]
pub use self::http_source::HttpSource;

pub enum SourceWrapper {
  File(FileSource),
  #[cfg(feature = "remote_source")]
  Http(HttpSource),
}

impl FromUrl for SourceWrapper {
  type Error = PredictionSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "file" => Ok(SourceWrapper::File(FileSource::from_url(url)?)),
      #[cfg(feature = "remote_source")]
      "http" | HttpSource::SCHEME => Ok(SourceWrapper::Http(HttpSource::from_url(url)?)),
      other => Err(PredictionSourceError::SchemeMismatch(format!(
        "不支持的预测源方案 '{}'",
        other
      ))),
    }
  }
}

impl PredictionSource for SourceWrapper {
  fn predict(&self, image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
    match self {
      SourceWrapper::File(source) => source.predict(image),
      #[cfg(feature = "remote_source")]
      SourceWrapper::Http(source) => source.predict(image),
    }
  }
}
