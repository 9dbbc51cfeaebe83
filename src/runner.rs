// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/runner.rs - 检测工作进程运行器
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
  io::Read,
  path::{Path, PathBuf},
  process::{Child, Command, Stdio},
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::summary::RawOutput;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum RunnerError {
  #[error("找不到工作进程程序: {0}")]
  WorkerNotFound(String),
  #[error("输入图像不存在: {0}")]
  ImageNotFound(PathBuf),
  #[error("工作进程运行超过 {0:?}，已终止")]
  Timeout(Duration),
  #[error("无法启动工作进程: {0}")]
  LaunchFailure(std::io::Error),
  #[error("等待工作进程时出错: {0}")]
  IoError(#[from] std::io::Error),
}

/// 工作进程身份：可执行程序及其固定的前置参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
  pub program: String,
  pub args: Vec<String>,
}

impl WorkerSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
    }
  }

  pub fn with_args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }

  /// 解析为实际可执行文件路径：含路径分隔符时直接检查，否则在 `PATH` 中查找
  pub fn resolve(&self) -> Result<PathBuf, RunnerError> {
    let program = Path::new(&self.program);
    if program.components().count() > 1 || program.is_absolute() {
      return if program.is_file() {
        Ok(program.to_path_buf())
      } else {
        Err(RunnerError::WorkerNotFound(self.program.clone()))
      };
    }

    std::env::var_os("PATH")
      .iter()
      .flat_map(std::env::split_paths)
      .map(|dir| dir.join(program))
      .find(|candidate| candidate.is_file())
      .ok_or_else(|| RunnerError::WorkerNotFound(self.program.clone()))
  }
}

/// 工作进程正常结束时捕获的输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutput {
  pub stdout: String,
  pub stderr: String,
  /// 被信号终止时为 `None`
  pub exit_code: Option<i32>,
}

impl WorkerOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }

  pub fn raw(&self) -> RawOutput {
    RawOutput {
      stdout: self.stdout.clone(),
      stderr: self.stderr.clone(),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct JobRunner;

impl JobRunner {
  /// 以 `<image> <output_dir>` 两个位置参数启动工作进程，并在 `timeout` 内返回。
  /// 非零退出码不视为错误，输出交由提取器解释。
  pub fn run(
    &self,
    worker: &WorkerSpec,
    image: &Path,
    output_dir: &Path,
    timeout: Duration,
  ) -> Result<WorkerOutput, RunnerError> {
    let program = worker.resolve()?;
    if !image.is_file() {
      return Err(RunnerError::ImageNotFound(image.to_path_buf()));
    }

    info!("启动工作进程 {:?} 处理 {:?}", program, image);
    let mut child = Command::new(&program)
      .args(&worker.args)
      .arg(image)
      .arg(output_dir)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(RunnerError::LaunchFailure)?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let started = Instant::now();
    let status = match wait_with_deadline(&mut child, started + timeout)? {
      Some(status) => status,
      None => {
        warn!("工作进程超时 ({:?})，终止进程 {}", timeout, child.id());
        terminate(&mut child);
        // 读取线程可能被孙进程持有的管道阻塞，此处不再等待
        return Err(RunnerError::Timeout(timeout));
      }
    };

    let output = WorkerOutput {
      stdout: join_reader(stdout),
      stderr: join_reader(stderr),
      exit_code: status.code(),
    };
    debug!(
      "工作进程结束: 退出码 {:?}, 耗时 {:.2?}, stdout {} 字节, stderr {} 字节",
      output.exit_code,
      started.elapsed(),
      output.stdout.len(),
      output.stderr.len()
    );
    Ok(output)
  }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
  pipe.map(|mut pipe| {
    thread::spawn(move || {
      let mut buffer = Vec::new();
      let _ = pipe.read_to_end(&mut buffer);
      String::from_utf8_lossy(&buffer).into_owned()
    })
  })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
  handle
    .and_then(|handle| handle.join().ok())
    .unwrap_or_default()
}

fn wait_with_deadline(
  child: &mut Child,
  deadline: Instant,
) -> Result<Option<std::process::ExitStatus>, RunnerError> {
  loop {
    if let Some(status) = child.try_wait()? {
      return Ok(Some(status));
    }
    let now = Instant::now();
    if now >= deadline {
      return Ok(None);
    }
    thread::sleep(POLL_INTERVAL.min(deadline - now));
  }
}

fn terminate(child: &mut Child) {
  if let Err(e) = child.kill() {
    warn!("终止工作进程失败: {}", e);
  }
  if let Err(e) = child.wait() {
    warn!("回收工作进程失败: {}", e);
  }
}
