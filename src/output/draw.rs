// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Corners, Prediction};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 无字体时估算标签宽度
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_HORIZONTAL_PADDING: i32 = 3;
const BOX_THICKNESS: i32 = 3;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色

const FONT_SEARCH_PATHS: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/usr/share/fonts/noto/NotoSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "/Library/Fonts/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font_size: f32,
  label_text_vertical_padding: i32,
  thickness: i32,
  color: [u8; 3],
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    let font = FONT_SEARCH_PATHS
      .iter()
      .find_map(|path| load_font(Path::new(path)).ok());
    if font.is_none() {
      warn!("未找到可用字体，标签将只绘制背景");
    }
    Self::with_font(font)
  }
}

fn load_font(path: &Path) -> Result<FontArc, DrawError> {
  let data = std::fs::read(path)?;
  let font = FontArc::try_from_vec(data)?;
  debug!("加载字体: {:?}", path);
  Ok(font)
}

impl Draw {
  pub fn with_font(font: Option<FontArc>) -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
      font,
    }
  }

  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    Ok(Self::with_font(Some(load_font(path)?)))
  }

  pub fn draw_predictions(&self, image: &mut RgbImage, predictions: &[Prediction]) {
    for prediction in predictions {
      self.draw_bbox_with_label(image, &prediction.corners(), &prediction.label());
    }
  }

  // bbox 为像素坐标的角点，仅在此处取整
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &Corners, label: &str) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let (w, h) = (image.width() as i32, image.height() as i32);

    // 完全在图像之外的框不绘制
    if bbox.x1 < 0.0 || bbox.y1 < 0.0 || bbox.x0 >= w as f32 || bbox.y0 >= h as f32 {
      return;
    }

    let x_min = (bbox.x0.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y0.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.x1.ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.y1.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.color);

    for thickness in 0..self.thickness {
      let x_min_t = (x_min + thickness).min(x_max);
      let y_min_t = (y_min + thickness).min(y_max);
      let x_max_t = (x_max - thickness).max(x_min);
      let y_max_t = (y_max - thickness).max(y_min);

      // 上下边
      for x in x_min_t..=x_max_t {
        image.put_pixel(x as u32, y_min_t as u32, color);
        image.put_pixel(x as u32, y_max_t as u32, color);
      }

      // 左右边
      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t as u32, y as u32, color);
        image.put_pixel(x_max_t as u32, y as u32, color);
      }
    }

    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = match &self.font {
      Some(font) => {
        let (tw, th) = text_size(scale, font, label);
        (
          tw as i32 + 2 * LABEL_TEXT_HORIZONTAL_PADDING,
          (th as i32 + 2 * self.label_text_vertical_padding).max(LABEL_TEXT_HEIGHT),
        )
      }
      None => (
        (label.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32,
        LABEL_TEXT_HEIGHT,
      ),
    };

    // 标签紧贴在框的上方，顶部越界时下移到图像内
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);

    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = text_height.min(h - label_y).max(0) as u32;

    if label_width > 0 && label_height > 0 {
      let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, color);

      if let Some(font) = &self.font {
        draw_text_mut(
          image,
          Rgb([255u8, 255u8, 255u8]),
          label_x + LABEL_TEXT_HORIZONTAL_PADDING,
          label_y + self.label_text_vertical_padding,
          scale,
          font,
          label,
        );
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

  fn prediction(x: f32, y: f32, width: f32, height: f32) -> Prediction {
    Prediction {
      class_name: "eye".to_string(),
      confidence: 0.91,
      x,
      y,
      width,
      height,
    }
  }

  #[test]
  fn draws_outline_at_corner_coordinates() {
    let draw = Draw::with_font(None);
    let mut image = RgbImage::from_pixel(100, 100, BACKGROUND);
    draw.draw_predictions(&mut image, &[prediction(50.0, 60.0, 20.0, 10.0)]);

    let red = Rgb(BOX_COLOR);
    assert_eq!(*image.get_pixel(40, 55), red);
    assert_eq!(*image.get_pixel(60, 65), red);
    assert_eq!(*image.get_pixel(50, 65), red);
    // 框内部保持原样
    assert_eq!(*image.get_pixel(50, 60), BACKGROUND);
    // 标签位于框上方
    assert_eq!(*image.get_pixel(41, 50), red);
  }

  #[test]
  fn box_outside_image_leaves_it_untouched() {
    let draw = Draw::with_font(None);
    let mut image = RgbImage::from_pixel(100, 100, BACKGROUND);
    let original = image.clone();
    draw.draw_predictions(&mut image, &[prediction(1000.0, 1000.0, 10.0, 10.0)]);
    assert_eq!(image, original);
  }

  #[test]
  fn label_at_top_edge_stays_inside_image() {
    let draw = Draw::with_font(None);
    let mut image = RgbImage::from_pixel(30, 30, BACKGROUND);
    draw.draw_predictions(&mut image, &[prediction(15.0, 5.0, 10.0, 6.0)]);
    assert_eq!(*image.get_pixel(11, 0), Rgb(BOX_COLOR));
  }

  #[test]
  fn invalid_font_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(
      Draw::with_font_file(&path),
      Err(DrawError::InvalidFont(_))
    ));
    assert!(matches!(
      Draw::with_font_file(&dir.path().join("missing.ttf")),
      Err(DrawError::IoError(_))
    ));
  }
}
