// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/output.rs - 结果组装：标注图、裁剪与压缩包
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

use image::ImageFormat;
use thiserror::Error;
use tracing::info;

use crate::{
  category::Category,
  input::{ImageFileInput, ImageFileInputError},
  model::{Prediction, PredictionSourceError},
  summary::{FailureKind, JobFailure, JobResult},
};

pub mod archive;
pub mod crop;
pub mod draw;

pub use self::archive::{ArchiveError, write_archive};
pub use self::crop::{CROP_DIRECTORY, CropWriter, crop_file_name};
pub use self::draw::{Draw, DrawError};

#[derive(Error, Debug)]
pub enum AssembleError {
  #[error("输入图像错误: {0}")]
  Input(#[from] ImageFileInputError),
  #[error("预测源错误: {0}")]
  Source(#[from] PredictionSourceError),
  #[error("图像保存错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("压缩包错误: {0}")]
  Archive(#[from] ArchiveError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的输入文件名: {0}")]
  InvalidFileName(PathBuf),
}

impl AssembleError {
  pub fn failure_kind(&self) -> FailureKind {
    match self {
      AssembleError::Input(ImageFileInputError::NotFound(_)) => FailureKind::Precondition,
      AssembleError::Input(ImageFileInputError::IoError(_)) => FailureKind::Io,
      AssembleError::Input(ImageFileInputError::DecodeError(_)) => FailureKind::Image,
      AssembleError::Source(_) => FailureKind::Upstream,
      AssembleError::ImageError(_) => FailureKind::Image,
      AssembleError::InvalidFileName(_) => FailureKind::Precondition,
      AssembleError::Archive(_) | AssembleError::IoError(_) => FailureKind::Io,
    }
  }
}

impl From<&AssembleError> for JobFailure {
  fn from(err: &AssembleError) -> Self {
    JobFailure::new(err.failure_kind(), err.to_string())
  }
}

/// 标注图文件名：`annotated_<输入文件名>`
pub fn annotated_file_name(image: &Path) -> Option<String> {
  image
    .file_name()
    .map(|name| format!("annotated_{}", name.to_string_lossy()))
}

/// 把预测列表转换为标注图、裁剪目录与压缩包
pub struct Assembler {
  draw: Draw,
}

impl Default for Assembler {
  fn default() -> Self {
    Self::new(Draw::default())
  }
}

impl Assembler {
  pub fn new(draw: Draw) -> Self {
    Self { draw }
  }

  pub fn assemble(
    &self,
    image_path: &Path,
    predictions: Vec<Prediction>,
    output_dir: &Path,
    category: Category,
  ) -> Result<JobResult, AssembleError> {
    let input = ImageFileInput::open(image_path)?;
    self.assemble_input(&input, predictions, output_dir, category)
  }

  pub fn assemble_input(
    &self,
    input: &ImageFileInput,
    mut predictions: Vec<Prediction>,
    output_dir: &Path,
    category: Category,
  ) -> Result<JobResult, AssembleError> {
    if let Some(class_name) = category.class_filter() {
      predictions.retain(|p| p.class_name == class_name);
    }
    info!(
      "组装 {} 结果: {} 个预测 -> {:?}",
      category,
      predictions.len(),
      output_dir
    );

    std::fs::create_dir_all(output_dir)?;

    let file_name = annotated_file_name(input.path())
      .ok_or_else(|| AssembleError::InvalidFileName(input.path().to_path_buf()))?;
    let annotated_image = output_dir.join(file_name);

    // 按输入内容的格式编码，输入文件名可能没有扩展名
    let mut annotated = input.image().clone();
    self.draw.draw_predictions(&mut annotated, &predictions);
    annotated.save_with_format(
      &annotated_image,
      input.format().unwrap_or(ImageFormat::Png),
    )?;

    let crop_dir = output_dir.join(CROP_DIRECTORY);
    let writer = CropWriter::new(&crop_dir, category.crop_extension());
    writer.reset()?;
    let saved_crops = writer.write_crops(input.image(), &predictions)?;

    let zip_file = output_dir.join(category.archive_name());
    write_archive(&zip_file, &saved_crops)?;

    info!(
      "{} 结果完成: {} 个检测, {} 个裁剪",
      category,
      predictions.len(),
      saved_crops.len()
    );

    Ok(JobResult {
      image: input.path().to_path_buf(),
      annotated_image,
      count: predictions.len(),
      saved_crops,
      zip_file,
    })
  }
}
