// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/task.rs - 单个检测任务的执行
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
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
  category::Category,
  extract::extract,
  input::ImageFileInput,
  model::PredictionSource,
  output::{AssembleError, Assembler, CROP_DIRECTORY, annotated_file_name},
  runner::{JobRunner, RunnerError, WorkerSpec},
  summary::{FailureKind, JobFailure, JobOutcome, JobResult},
};

/// 一次检测任务：某个类别、一张输入图像、一个输出目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
  pub category: Category,
  pub image: PathBuf,
  pub output_dir: PathBuf,
}

impl Job {
  pub fn new(category: Category, image: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
    Self {
      category,
      image: image.into(),
      output_dir: output_dir.into(),
    }
  }
}

pub trait Task: Sized {
  /// 执行一次任务；失败以 `JobOutcome::Failed` 返回而不是向上传播
  fn run_task(self, job: &Job) -> JobOutcome;
}

/// 在当前进程内调用预测源并组装结果
pub struct AssembleTask<'a, S> {
  source: S,
  assembler: &'a Assembler,
}

impl<'a, S: PredictionSource> AssembleTask<'a, S> {
  pub fn new(source: S, assembler: &'a Assembler) -> Self {
    Self { source, assembler }
  }

  pub fn try_run(&self, job: &Job) -> Result<JobResult, AssembleError> {
    let input = ImageFileInput::open(&job.image)?;

    let now = Instant::now();
    let predictions = self.source.predict(&job.image)?;
    info!(
      "{} 预测完成，耗时: {:.2?}，共 {} 个预测",
      job.category,
      now.elapsed(),
      predictions.len()
    );

    self
      .assembler
      .assemble_input(&input, predictions, &job.output_dir, job.category)
  }
}

impl<S: PredictionSource> Task for AssembleTask<'_, S> {
  fn run_task(self, job: &Job) -> JobOutcome {
    match self.try_run(job) {
      Ok(result) => JobOutcome::Completed(result),
      Err(e) => {
        error!("{} 任务失败: {}", job.category, e);
        JobOutcome::Failed(JobFailure::from(&e))
      }
    }
  }
}

/// 在独立的工作进程中执行任务，再从其输出中提取结果
pub struct WorkerTask<'a> {
  runner: &'a JobRunner,
  worker: &'a WorkerSpec,
  timeout: Duration,
}

impl<'a> WorkerTask<'a> {
  pub fn new(runner: &'a JobRunner, worker: &'a WorkerSpec, timeout: Duration) -> Self {
    Self {
      runner,
      worker,
      timeout,
    }
  }
}

fn runner_failure(err: &RunnerError) -> JobFailure {
  let kind = match err {
    RunnerError::WorkerNotFound(_) | RunnerError::ImageNotFound(_) => FailureKind::Precondition,
    RunnerError::Timeout(_) => FailureKind::Timeout,
    RunnerError::LaunchFailure(_) => FailureKind::Launch,
    RunnerError::IoError(_) => FailureKind::Io,
  };
  JobFailure::new(kind, err.to_string())
}

fn ensure_output_dir(dir: &Path) -> Result<(), JobFailure> {
  std::fs::create_dir_all(dir).map_err(|e| {
    JobFailure::new(
      FailureKind::Io,
      format!("无法创建输出目录 {}: {}", dir.display(), e),
    )
  })
}

/// 超时的工作进程可能已写出部分结果，删除本任务的标注图、裁剪目录与压缩包
fn discard_artifacts(job: &Job) {
  let mut files = vec![job.output_dir.join(job.category.archive_name())];
  if let Some(name) = annotated_file_name(&job.image) {
    files.push(job.output_dir.join(name));
  }

  for file in files.iter().filter(|f| f.exists()) {
    if let Err(e) = std::fs::remove_file(file) {
      warn!("无法删除残留文件 {:?}: {}", file, e);
    }
  }

  let crops = job.output_dir.join(CROP_DIRECTORY);
  if crops.exists() {
    if let Err(e) = std::fs::remove_dir_all(&crops) {
      warn!("无法删除残留裁剪目录 {:?}: {}", crops, e);
    }
  }
}

impl Task for WorkerTask<'_> {
  fn run_task(self, job: &Job) -> JobOutcome {
    if let Err(failure) = ensure_output_dir(&job.output_dir) {
      return JobOutcome::Failed(failure);
    }

    let output = match self
      .runner
      .run(self.worker, &job.image, &job.output_dir, self.timeout)
    {
      Ok(output) => output,
      Err(e) => {
        error!("{} 工作进程失败: {}", job.category, e);
        if matches!(e, RunnerError::Timeout(_)) {
          discard_artifacts(job);
        }
        return JobOutcome::Failed(runner_failure(&e));
      }
    };

    let Some(object) = extract(&[&output.stdout, &output.stderr]) else {
      error!(
        "{} 工作进程输出中没有可解析的结果对象 (退出码 {:?})",
        job.category, output.exit_code
      );
      return JobOutcome::Failed(
        JobFailure::new(
          FailureKind::Extraction,
          format!(
            "工作进程输出中没有可解析的结果对象 (退出码 {:?})",
            output.exit_code
          ),
        )
        .with_raw_output(output.raw()),
      );
    };

    match JobOutcome::from_object(job.category, &object) {
      JobOutcome::Failed(failure) => {
        error!("{} 工作进程报告错误: {}", job.category, failure.message);
        JobOutcome::Failed(failure.with_raw_output(output.raw()))
      }
      completed => {
        info!("{} 工作进程完成 (退出码 {:?})", job.category, output.exit_code);
        completed
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{Prediction, PredictionSourceError},
    output::Draw,
  };
  use image::{Rgb, RgbImage};

  struct FixedSource(Vec<Prediction>);

  impl PredictionSource for FixedSource {
    fn predict(&self, _image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
      Ok(self.0.clone())
    }
  }

  struct FailingSource;

  impl PredictionSource for FailingSource {
    fn predict(&self, _image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
      Err(PredictionSourceError::Unreachable("connection refused".into()))
    }
  }

  fn image(dir: &Path) -> PathBuf {
    let path = dir.join("input.png");
    RgbImage::from_pixel(64, 64, Rgb([5, 5, 5])).save(&path).unwrap();
    path
  }

  #[test]
  fn assemble_task_completes() {
    let dir = tempfile::tempdir().unwrap();
    let job = Job::new(Category::Eye, image(dir.path()), dir.path().join("eye"));
    let assembler = Assembler::new(Draw::with_font(None));
    let source = FixedSource(vec![Prediction {
      class_name: "eye".into(),
      confidence: 0.9,
      x: 32.0,
      y: 32.0,
      width: 10.0,
      height: 6.0,
    }]);

    let outcome = AssembleTask::new(source, &assembler).run_task(&job);
    let result = outcome.result().unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.saved_crops.len(), 1);
  }

  #[test]
  fn upstream_failure_surfaces_as_error_field() {
    let dir = tempfile::tempdir().unwrap();
    let job = Job::new(Category::Nail, image(dir.path()), dir.path().join("nail"));
    let assembler = Assembler::new(Draw::with_font(None));

    let outcome = AssembleTask::new(FailingSource, &assembler).run_task(&job);
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Upstream);
    assert!(failure.message.contains("connection refused"));
    assert!(!job.output_dir.join("nail_crops.zip").exists());
  }

  #[cfg(unix)]
  mod worker {
    use super::*;

    fn shell(script: &str) -> WorkerSpec {
      WorkerSpec::new("/bin/sh").with_args(["-c", script, "worker"])
    }

    #[test]
    fn parses_result_object_amid_logs() {
      let dir = tempfile::tempdir().unwrap();
      let job = Job::new(Category::Eye, image(dir.path()), dir.path().join("eye"));
      let script = r#"echo "loading model"; echo "{\"image\": \"$1\", \"annotated_image\": \"$2/annotated_input.png\", \"num_eyes\": 0, \"saved_eyes\": [], \"zip_file\": \"$2/eye_crops.zip\"}"; echo bye"#;
      let worker = shell(script);

      let outcome =
        WorkerTask::new(&JobRunner, &worker, Duration::from_secs(10)).run_task(&job);
      let result = outcome.result().unwrap();
      assert_eq!(result.count, 0);
      assert_eq!(result.image, job.image);
      assert_eq!(result.zip_file, job.output_dir.join("eye_crops.zip"));
    }

    #[test]
    fn garbage_output_is_extraction_failure_with_raw_text() {
      let dir = tempfile::tempdir().unwrap();
      let job = Job::new(Category::Palm, image(dir.path()), dir.path().join("palm"));
      let worker = shell("echo 'segmentation fault'; echo 'core dumped' >&2; exit 139");

      let outcome =
        WorkerTask::new(&JobRunner, &worker, Duration::from_secs(10)).run_task(&job);
      let failure = outcome.failure().unwrap();
      assert_eq!(failure.kind, FailureKind::Extraction);
      let raw = failure.raw_output.as_ref().unwrap();
      assert!(raw.stdout.contains("segmentation fault"));
      assert!(raw.stderr.contains("core dumped"));
    }

    #[test]
    fn error_object_on_non_zero_exit() {
      let dir = tempfile::tempdir().unwrap();
      let job = Job::new(Category::Nail, image(dir.path()), dir.path().join("nail"));
      let worker = shell(r#"echo '{"error": "quota exceeded", "kind": "upstream"}'; exit 1"#);

      let outcome =
        WorkerTask::new(&JobRunner, &worker, Duration::from_secs(10)).run_task(&job);
      let failure = outcome.failure().unwrap();
      assert_eq!(failure.kind, FailureKind::Upstream);
      assert_eq!(failure.message, "quota exceeded");
    }

    #[test]
    fn timeout_produces_no_artifacts() {
      let dir = tempfile::tempdir().unwrap();
      let job = Job::new(Category::Eye, image(dir.path()), dir.path().join("eye"));
      let worker = shell("exec sleep 30");

      let outcome =
        WorkerTask::new(&JobRunner, &worker, Duration::from_millis(200)).run_task(&job);
      assert_eq!(outcome.failure().unwrap().kind, FailureKind::Timeout);
      assert!(!job.output_dir.join("eye_crops.zip").exists());
      assert!(!job.output_dir.join("annotated_input.png").exists());
    }

    #[test]
    fn timeout_removes_partial_and_stale_artifacts() {
      let dir = tempfile::tempdir().unwrap();
      let job = Job::new(Category::Nail, image(dir.path()), dir.path().join("nail"));
      std::fs::create_dir_all(job.output_dir.join("crops")).unwrap();
      std::fs::write(job.output_dir.join("nail_crops.zip"), b"stale").unwrap();
      std::fs::write(job.output_dir.join("crops").join("crop_0_nail.png"), b"stale").unwrap();
      let worker = shell(r#"touch "$2/annotated_input.png"; exec sleep 30"#);

      let outcome =
        WorkerTask::new(&JobRunner, &worker, Duration::from_secs(1)).run_task(&job);
      assert_eq!(outcome.failure().unwrap().kind, FailureKind::Timeout);
      assert!(!job.output_dir.join("annotated_input.png").exists());
      assert!(!job.output_dir.join("nail_crops.zip").exists());
      assert!(!job.output_dir.join("crops").exists());
    }

    #[test]
    fn missing_image_is_precondition_failure() {
      let dir = tempfile::tempdir().unwrap();
      let job = Job::new(Category::Eye, dir.path().join("missing.png"), dir.path().join("eye"));
      let worker = shell("echo should-not-run");

      let outcome =
        WorkerTask::new(&JobRunner, &worker, Duration::from_secs(1)).run_task(&job);
      assert_eq!(outcome.failure().unwrap().kind, FailureKind::Precondition);
    }
  }
}
