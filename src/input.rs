// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/input.rs - 图像文件输入
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

use image::{ImageFormat, ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("图像文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码失败: {0}")]
  DecodeError(#[from] image::ImageError),
}

/// 已解码的输入图像
pub struct ImageFileInput {
  path: PathBuf,
  image: RgbImage,
  /// 按文件内容识别出的格式，与扩展名无关
  format: Option<ImageFormat>,
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, ImageFileInputError> {
    if !path.is_file() {
      error!("图像文件不存在: {:?}", path);
      return Err(ImageFileInputError::NotFound(path.to_path_buf()));
    }

    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let image = reader.decode()?.to_rgb8();
    debug!(
      "读取图像 {:?}: {}x{} ({:?})",
      path,
      image.width(),
      image.height(),
      format
    );

    Ok(ImageFileInput {
      path: path.to_path_buf(),
      image,
      format,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn format(&self) -> Option<ImageFormat> {
    self.format
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opens_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.png");
    RgbImage::from_pixel(8, 6, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();

    let input = ImageFileInput::open(&path).unwrap();
    assert_eq!((input.width(), input.height()), (8, 6));
    assert_eq!(input.path(), path.as_path());
  }

  #[test]
  fn format_comes_from_content_not_extension() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("sample.png");
    RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9]))
      .save(&png)
      .unwrap();
    let upload = dir.path().join("upload");
    std::fs::rename(&png, &upload).unwrap();

    let input = ImageFileInput::open(&upload).unwrap();
    assert_eq!(input.format(), Some(ImageFormat::Png));
  }

  #[test]
  fn missing_file_is_not_found() {
    assert!(matches!(
      ImageFileInput::open(Path::new("/nonexistent/image.png")),
      Err(ImageFileInputError::NotFound(_))
    ));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.png");
    std::fs::write(&path, b"definitely not an image").unwrap();
    assert!(matches!(
      ImageFileInput::open(&path),
      Err(ImageFileInputError::DecodeError(_))
    ));
  }
}
