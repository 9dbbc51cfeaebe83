// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/summary.rs - 任务结果记录
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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::{category::Category, extract::ParsedObject};

/// 一次检测任务成功后的摘要
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
  pub image: PathBuf,
  pub annotated_image: PathBuf,
  /// 收到的预测数（类别过滤之后、几何裁剪之前）
  pub count: usize,
  pub saved_crops: Vec<PathBuf>,
  pub zip_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  Precondition,
  Upstream,
  Timeout,
  Extraction,
  Launch,
  Image,
  Io,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
  pub stdout: String,
  pub stderr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
  pub kind: FailureKind,
  pub message: String,
  /// 工作进程的原始输出，供排查
  pub raw_output: Option<RawOutput>,
}

impl JobFailure {
  pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      raw_output: None,
    }
  }

  pub fn with_raw_output(mut self, raw_output: RawOutput) -> Self {
    self.raw_output = Some(raw_output);
    self
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
  Completed(JobResult),
  Failed(JobFailure),
}

impl JobOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, JobOutcome::Completed(_))
  }

  pub fn result(&self) -> Option<&JobResult> {
    match self {
      JobOutcome::Completed(result) => Some(result),
      JobOutcome::Failed(_) => None,
    }
  }

  pub fn failure(&self) -> Option<&JobFailure> {
    match self {
      JobOutcome::Completed(_) => None,
      JobOutcome::Failed(failure) => Some(failure),
    }
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum SummaryError {
  #[error("结果对象缺少字段 `{0}`")]
  MissingField(&'static str),
  #[error("结果对象字段 `{0}` 类型错误")]
  InvalidField(&'static str),
}

fn path_field(object: &ParsedObject, field: &'static str) -> Result<PathBuf, SummaryError> {
  match object.get(field) {
    Some(Value::String(path)) => Ok(PathBuf::from(path)),
    Some(_) => Err(SummaryError::InvalidField(field)),
    None => Err(SummaryError::MissingField(field)),
  }
}

fn path_string(path: &std::path::Path) -> String {
  path.to_string_lossy().into_owned()
}

impl JobResult {
  /// 序列化为对外格式，数量与裁剪列表字段按类别命名
  pub fn to_json(&self, category: Category) -> Value {
    let mut object = Map::new();
    object.insert("image".into(), json!(path_string(&self.image)));
    object.insert(
      "annotated_image".into(),
      json!(path_string(&self.annotated_image)),
    );
    object.insert(category.count_field().into(), json!(self.count));
    object.insert(
      category.crops_field().into(),
      Value::Array(
        self
          .saved_crops
          .iter()
          .map(|p| json!(path_string(p)))
          .collect(),
      ),
    );
    object.insert("zip_file".into(), json!(path_string(&self.zip_file)));
    Value::Object(object)
  }

  pub fn from_json(category: Category, object: &ParsedObject) -> Result<Self, SummaryError> {
    let count = match object.get(category.count_field()) {
      Some(value) => value
        .as_u64()
        .ok_or(SummaryError::InvalidField(category.count_field()))? as usize,
      None => return Err(SummaryError::MissingField(category.count_field())),
    };

    let saved_crops = match object.get(category.crops_field()) {
      Some(Value::Array(items)) => items
        .iter()
        .map(|item| {
          item
            .as_str()
            .map(PathBuf::from)
            .ok_or(SummaryError::InvalidField(category.crops_field()))
        })
        .collect::<Result<Vec<_>, _>>()?,
      Some(_) => return Err(SummaryError::InvalidField(category.crops_field())),
      None => return Err(SummaryError::MissingField(category.crops_field())),
    };

    Ok(JobResult {
      image: path_field(object, "image")?,
      annotated_image: path_field(object, "annotated_image")?,
      count,
      saved_crops,
      zip_file: path_field(object, "zip_file")?,
    })
  }
}

impl JobFailure {
  pub fn to_json(&self) -> Value {
    let mut object = Map::new();
    object.insert("error".into(), json!(self.message));
    object.insert("kind".into(), json!(self.kind));
    if let Some(raw) = &self.raw_output {
      object.insert("raw_output".into(), json!(raw));
    }
    Value::Object(object)
  }

  /// 工作进程输出的 `{"error": ...}` 对象；不含 `error` 字段时返回 `None`
  pub fn from_json(object: &ParsedObject) -> Option<Self> {
    let message = match object.get("error")? {
      Value::String(message) => message.clone(),
      other => other.to_string(),
    };
    let kind = object
      .get("kind")
      .and_then(|kind| serde_json::from_value(kind.clone()).ok())
      .unwrap_or(FailureKind::Upstream);
    Some(JobFailure::new(kind, message))
  }
}

impl JobOutcome {
  pub fn to_json(&self, category: Category) -> Value {
    match self {
      JobOutcome::Completed(result) => result.to_json(category),
      JobOutcome::Failed(failure) => failure.to_json(),
    }
  }

  /// 把提取到的对象解释为任务结果；既非成功也非错误对象时视为提取失败
  pub fn from_object(category: Category, object: &ParsedObject) -> Self {
    if let Some(failure) = JobFailure::from_json(object) {
      return JobOutcome::Failed(failure);
    }
    match JobResult::from_json(category, object) {
      Ok(result) => JobOutcome::Completed(result),
      Err(e) => JobOutcome::Failed(JobFailure::new(FailureKind::Extraction, e.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn object(value: Value) -> ParsedObject {
    match value {
      Value::Object(object) => object,
      _ => panic!("not an object"),
    }
  }

  fn sample() -> JobResult {
    JobResult {
      image: PathBuf::from("in/hand.jpg"),
      annotated_image: PathBuf::from("out/palm/annotated_hand.jpg"),
      count: 2,
      saved_crops: vec![PathBuf::from("out/palm/crops/crop_0_palmcenter.jpg")],
      zip_file: PathBuf::from("out/palm/palm_crops.zip"),
    }
  }

  #[test]
  fn serialises_with_category_field_names() {
    let value = sample().to_json(Category::Palm);
    assert_eq!(value["num_palms"], json!(2));
    assert_eq!(
      value["saved_palms"],
      json!(["out/palm/crops/crop_0_palmcenter.jpg"])
    );
    assert!(value.get("count").is_none());
  }

  #[test]
  fn parses_worker_object_back() {
    let value = sample().to_json(Category::Palm);
    let parsed = JobResult::from_json(Category::Palm, &object(value)).unwrap();
    assert_eq!(parsed, sample());
  }

  #[test]
  fn wrong_category_fields_are_missing() {
    let value = sample().to_json(Category::Palm);
    assert_eq!(
      JobResult::from_json(Category::Eye, &object(value)),
      Err(SummaryError::MissingField("num_eyes"))
    );
  }

  #[test]
  fn error_object_becomes_failure() {
    let outcome = JobOutcome::from_object(
      Category::Nail,
      &object(json!({"error": "Workflow failed: 503", "kind": "upstream"})),
    );
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Upstream);
    assert_eq!(failure.message, "Workflow failed: 503");
  }

  #[test]
  fn error_object_without_kind_defaults_to_upstream() {
    let failure = JobFailure::from_json(&object(json!({"error": "File not found: x.png"}))).unwrap();
    assert_eq!(failure.kind, FailureKind::Upstream);
  }

  #[test]
  fn unrelated_object_is_an_extraction_failure() {
    let outcome = JobOutcome::from_object(Category::Eye, &object(json!({"status": "ok"})));
    assert_eq!(outcome.failure().unwrap().kind, FailureKind::Extraction);
  }

  #[test]
  fn failure_json_carries_raw_output() {
    let failure = JobFailure::new(FailureKind::Extraction, "no result").with_raw_output(RawOutput {
      stdout: "hello".into(),
      stderr: "oops".into(),
    });
    let value = failure.to_json();
    assert_eq!(value["kind"], json!("extraction"));
    assert_eq!(value["raw_output"]["stderr"], json!("oops"));
  }
}
