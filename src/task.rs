// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务循环
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
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
  frame::Frame,
  input::FrameSource,
  model::DetectionModel,
  output::FrameSink,
  pipeline::{FrameDetectionPipeline, FrameReport, PipelineError},
  rate::RateEstimator,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<SessionSummary, Self::Error>;
}

/// 一次运行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionSummary {
  pub frames: u64,
  /// 流水线处理时间之和，不含读帧与写帧
  pub processing: Duration,
}

impl SessionSummary {
  fn record(&mut self, elapsed: Duration) {
    self.frames += 1;
    self.processing += elapsed;
  }

  pub fn average_fps(&self) -> f64 {
    let secs = self.processing.as_secs_f64();
    if self.frames == 0 || secs <= 0.0 {
      0.0
    } else {
      self.frames as f64 / secs
    }
  }

  pub fn log(&self) {
    warn!(
      "共处理 {} 帧, 总耗时 {:.2?}, 平均 FPS: {:.2}",
      self.frames,
      self.processing,
      self.average_fps()
    );
  }
}

fn process_frame<M>(
  pipeline: &FrameDetectionPipeline,
  model: &M,
  frame: &mut Frame,
  rate: &mut RateEstimator,
) -> Result<(FrameReport, Duration), PipelineError>
where
  M: DetectionModel,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let now = Instant::now();
  let report = pipeline.process(model, &mut frame.image, rate, now)?;
  Ok((report, now.elapsed()))
}

/// 单张图片：处理一帧并保存
pub struct OneShotTask {
  pipeline: FrameDetectionPipeline,
}

impl OneShotTask {
  pub fn new(pipeline: FrameDetectionPipeline) -> Self {
    Self { pipeline }
  }
}

impl<I, IE, M, O, OE> Task<I, M, O> for OneShotTask
where
  I: FrameSource<Error = IE>,
  IE: std::error::Error + Send + Sync + 'static,
  M: DetectionModel,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: FrameSink<Error = OE>,
  OE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<SessionSummary, Self::Error> {
    info!("开始任务...");
    let frame = input.next();
    input.finish()?;
    let mut frame = frame.ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");

    let mut rate = RateEstimator::new();
    let (report, elapsed) = process_frame(&self.pipeline, &model, &mut frame, &mut rate)?;
    info!(
      "推理完成，耗时: {:.2?}, 检测到 {} 个目标",
      elapsed,
      report.accepted.len()
    );
    for detection in report.detections() {
      info!("  {} @ {:?}", detection.label, detection.bbox);
    }

    output.write_frame(&frame.image)?;
    output.finish()?;

    let mut summary = SessionSummary::default();
    summary.record(elapsed);
    summary.log();
    Ok(summary)
  }
}

/// 视频：逐帧处理直到输入结束、遇到空帧、达到帧数或收到中断
pub struct ContinuousTask {
  pipeline: FrameDetectionPipeline,
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn new(pipeline: FrameDetectionPipeline) -> Self {
    Self {
      pipeline,
      frame_number: None,
      interrupt: None,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn limit_reached(&self, frames: u64) -> bool {
    self.frame_number.is_some_and(|n| frames >= n as u64)
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

/// 把 Ctrl-C 接到一个通道上，任务循环在两帧之间检查它
pub fn install_interrupt_handler() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

impl<I, IE, M, O, OE> Task<I, M, O> for ContinuousTask
where
  I: FrameSource<Error = IE>,
  IE: std::error::Error + Send + Sync + 'static,
  M: DetectionModel,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: FrameSink<Error = OE>,
  OE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<SessionSummary, Self::Error> {
    info!("开始任务...");
    let mut rate = RateEstimator::new();
    let mut summary = SessionSummary::default();

    loop {
      if self.limit_reached(summary.frames) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      let Some(mut frame) = input.next() else {
        break;
      };

      info!("处理第 {} 帧图像", frame.index + 1);
      match process_frame(&self.pipeline, &model, &mut frame, &mut rate) {
        Ok((report, elapsed)) => {
          info!(
            "推理完成，耗时: {:.2?}, 保留 {} 个目标, FPS {:.2}",
            elapsed,
            report.accepted.len(),
            report.fps
          );
          summary.record(elapsed);
        }
        Err(PipelineError::EmptyFrame) => {
          warn!("读到空帧，视频结束");
          break;
        }
        Err(e) => {
          error!("第 {} 帧在 {:?} 阶段失败: {}", frame.index + 1, e.stage(), e);
          return Err(e.into());
        }
      }
      output.write_frame(&frame.image)?;

      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    // 已写出的帧先落盘，再报告输入端的错误
    let input_result = input.finish();
    output.finish()?;
    summary.log();
    input_result?;
    info!("任务完成，退出");
    Ok(summary)
  }
}
