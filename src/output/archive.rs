// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/output/archive.rs - 裁剪结果打包
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
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

#[derive(Error, Debug)]
pub enum ArchiveError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("ZIP 错误: {0}")]
  ZipError(#[from] zip::result::ZipError),
  #[error("无效的文件名: {0}")]
  InvalidFileName(PathBuf),
}

/// 整体重建压缩包：条目按 `files` 顺序，以文件名作为条目名。
/// 先写临时文件再替换，旧压缩包不会与新裁剪集合混在一起。
pub fn write_archive(path: &Path, files: &[PathBuf]) -> Result<(), ArchiveError> {
  let partial = path.with_extension("zip.partial");

  if let Err(e) = write_entries(&partial, files) {
    if let Err(remove) = std::fs::remove_file(&partial) {
      warn!("无法删除未完成的压缩包 {:?}: {}", partial, remove);
    }
    return Err(e);
  }

  std::fs::rename(&partial, path)?;
  info!("写入压缩包 {:?}: {} 个条目", path, files.len());
  Ok(())
}

fn write_entries(partial: &Path, files: &[PathBuf]) -> Result<(), ArchiveError> {
  let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
  let mut zip = ZipWriter::new(BufWriter::new(File::create(partial)?));
  for file in files {
    let name = file
      .file_name()
      .ok_or_else(|| ArchiveError::InvalidFileName(file.clone()))?
      .to_string_lossy()
      .into_owned();
    zip.start_file(name, options)?;
    zip.write_all(&std::fs::read(file)?)?;
  }
  zip.finish()?.flush()?;
  Ok(())
}
