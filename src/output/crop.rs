// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/output/crop.rs - 检测区域裁剪
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

use image::{RgbImage, imageops};
use tracing::{debug, warn};

use crate::model::Prediction;

pub const CROP_DIRECTORY: &str = "crops";

/// `crop_<index>_<class>.<ext>`，类名中的非安全字符替换为 `_`
pub fn crop_file_name(index: usize, class_name: &str, extension: &str) -> String {
  let class: String = class_name
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
        c
      } else {
        '_'
      }
    })
    .collect();
  format!("crop_{}_{}.{}", index, class, extension)
}

pub struct CropWriter<'a> {
  directory: &'a Path,
  extension: &'a str,
}

impl<'a> CropWriter<'a> {
  pub fn new(directory: &'a Path, extension: &'a str) -> Self {
    Self {
      directory,
      extension,
    }
  }

  /// 清空并重建裁剪目录，保证目录内容只对应本次任务
  pub fn reset(&self) -> Result<(), std::io::Error> {
    if self.directory.exists() {
      std::fs::remove_dir_all(self.directory)?;
    }
    std::fs::create_dir_all(self.directory)
  }

  /// 从未标注的原图中裁剪每个预测，面积为零的区域跳过
  pub fn write_crops(
    &self,
    image: &RgbImage,
    predictions: &[Prediction],
  ) -> Result<Vec<PathBuf>, image::ImageError> {
    let mut saved = Vec::with_capacity(predictions.len());

    for (index, prediction) in predictions.iter().enumerate() {
      let Some(region) = prediction
        .corners()
        .clamp_to(image.width(), image.height())
      else {
        warn!(
          "跳过第 {} 个裁剪 ({}): 区域在图像范围之外",
          index, prediction.class_name
        );
        continue;
      };

      let crop = imageops::crop_imm(
        image,
        region.left,
        region.top,
        region.width(),
        region.height(),
      )
      .to_image();

      let path = self.directory.join(crop_file_name(
        index,
        &prediction.class_name,
        self.extension,
      ));
      crop.save(&path)?;
      debug!("保存裁剪 {:?}: {}x{}", path, region.width(), region.height());
      saved.push(path);
    }

    Ok(saved)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn prediction(class_name: &str, x: f32, y: f32, width: f32, height: f32) -> Prediction {
    Prediction {
      class_name: class_name.to_string(),
      confidence: 0.5,
      x,
      y,
      width,
      height,
    }
  }

  #[test]
  fn file_names_are_stable_and_sanitised() {
    assert_eq!(crop_file_name(0, "eye", "png"), "crop_0_eye.png");
    assert_eq!(crop_file_name(3, "left eye/../x", "jpg"), "crop_3_left_eye____x.jpg");
  }

  #[test]
  fn crops_have_box_dimensions_and_skip_off_image_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let crops = dir.path().join(CROP_DIRECTORY);
    let writer = CropWriter::new(&crops, "png");
    writer.reset().unwrap();

    let mut image = RgbImage::from_pixel(100, 100, Rgb([10, 10, 10]));
    image.put_pixel(40, 45, Rgb([200, 0, 0]));

    let saved = writer
      .write_crops(
        &image,
        &[
          prediction("eye", 50.0, 50.0, 20.0, 10.0),
          prediction("eye", 1000.0, 1000.0, 10.0, 10.0),
          prediction("eye", 95.0, 95.0, 20.0, 20.0),
        ],
      )
      .unwrap();

    assert_eq!(saved, vec![crops.join("crop_0_eye.png"), crops.join("crop_2_eye.png")]);

    let first = image::open(&saved[0]).unwrap().to_rgb8();
    assert_eq!(first.dimensions(), (20, 10));
    assert_eq!(*first.get_pixel(0, 0), Rgb([200, 0, 0]));

    let clamped = image::open(&saved[1]).unwrap().to_rgb8();
    assert_eq!(clamped.dimensions(), (15, 15));
  }

  #[test]
  fn reset_removes_stale_crops() {
    let dir = tempfile::tempdir().unwrap();
    let crops = dir.path().join(CROP_DIRECTORY);
    std::fs::create_dir_all(&crops).unwrap();
    std::fs::write(crops.join("crop_9_old.png"), b"stale").unwrap();

    CropWriter::new(&crops, "png").reset().unwrap();

    assert!(crops.is_dir());
    assert_eq!(std::fs::read_dir(&crops).unwrap().count(), 0);
  }
}
