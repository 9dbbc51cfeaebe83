// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/category.rs - 检测类别定义
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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的检测类别: {0}")]
pub struct InvalidCategory(pub String);

/// 支持的检测目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Eye,
  Palm,
  Nail,
}

impl Category {
  pub const ALL: [Category; 3] = [Category::Eye, Category::Palm, Category::Nail];

  pub fn name(&self) -> &'static str {
    match self {
      Category::Eye => "eye",
      Category::Palm => "palm",
      Category::Nail => "nail",
    }
  }

  /// 对外 JSON 中的检测数量字段名
  pub fn count_field(&self) -> &'static str {
    match self {
      Category::Eye => "num_eyes",
      Category::Palm => "num_palms",
      Category::Nail => "num_nails",
    }
  }

  /// 对外 JSON 中的裁剪列表字段名
  pub fn crops_field(&self) -> &'static str {
    match self {
      Category::Eye => "saved_eyes",
      Category::Palm => "saved_palms",
      Category::Nail => "saved_nails",
    }
  }

  /// 只保留该类名的预测；`None` 表示不过滤
  pub fn class_filter(&self) -> Option<&'static str> {
    match self {
      Category::Palm => Some("palmcenter"),
      Category::Eye | Category::Nail => None,
    }
  }

  pub fn crop_extension(&self) -> &'static str {
    match self {
      Category::Palm => "jpg",
      Category::Eye | Category::Nail => "png",
    }
  }

  pub fn archive_name(&self) -> String {
    format!("{}_crops.zip", self.name())
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Category {
  type Err = InvalidCategory;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let name = s.trim().to_ascii_lowercase();
    Category::ALL
      .into_iter()
      .find(|category| category.name() == name)
      .ok_or_else(|| InvalidCategory(s.to_string()))
  }
}
