// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 单帧检测与渲染流水线
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

//! 单帧流水线
//!
//! 每帧严格按顺序经历
//! `Idle → Normalizing → Inferring → Decoding → Suppressing → Rendering → Done`，
//! 不回退。空帧在任何渲染之前中止。

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
  config::DetectionConfig,
  decode::{Candidate, DecodeError, DetectionDecoder},
  frame::is_empty_image,
  labels::ClassLabels,
  model::DetectionModel,
  normalize::FrameNormalizer,
  rate::RateEstimator,
  render::Renderer,
  suppress::{BoxRect, suppress},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("空帧，无法处理")]
  EmptyFrame,
  #[error("推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
}

/// 单帧处理阶段，按声明顺序推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
  Idle,
  Normalizing,
  Inferring,
  Decoding,
  Suppressing,
  Rendering,
  Done,
}

impl PipelineError {
  /// 出错时所处的阶段
  pub fn stage(&self) -> Stage {
    match self {
      PipelineError::EmptyFrame => Stage::Idle,
      PipelineError::Inference(_) => Stage::Inferring,
      PipelineError::Decode(_) => Stage::Decoding,
    }
  }
}

/// 单帧处理结果
#[derive(Debug, Clone)]
pub struct FrameReport {
  pub candidates: Vec<Candidate>,
  /// 保留下来的候选索引
  pub accepted: Vec<usize>,
  pub fps: f64,
}

impl FrameReport {
  pub fn detections(&self) -> impl Iterator<Item = &Candidate> {
    self.accepted.iter().map(|&i| &self.candidates[i])
  }
}

pub struct FrameDetectionPipeline {
  config: DetectionConfig,
  normalizer: FrameNormalizer,
  decoder: DetectionDecoder,
  labels: ClassLabels,
  renderer: Renderer,
}

impl FrameDetectionPipeline {
  pub fn new(config: DetectionConfig, labels: ClassLabels, renderer: Renderer) -> Self {
    Self {
      config,
      normalizer: FrameNormalizer::new(config.long_edge),
      decoder: DetectionDecoder::new(config.confidence_threshold),
      labels,
      renderer,
    }
  }

  pub fn config(&self) -> &DetectionConfig {
    &self.config
  }

  pub fn labels(&self) -> &ClassLabels {
    &self.labels
  }

  /// 处理一帧：检测结果和帧率直接绘制在 `frame` 上
  pub fn process<M>(
    &self,
    model: &M,
    frame: &mut RgbImage,
    rate: &mut RateEstimator,
    now: Instant,
  ) -> Result<FrameReport, PipelineError>
  where
    M: DetectionModel,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut stage = Stage::Idle;
    if is_empty_image(frame) {
      return Err(PipelineError::EmptyFrame);
    }

    advance(&mut stage, Stage::Normalizing);
    let normalized = self.normalizer.normalize(frame);
    let (original_width, original_height) =
      (normalized.original_width, normalized.original_height);

    advance(&mut stage, Stage::Inferring);
    let raw = model
      .infer(&*normalized.input)
      .map_err(|e| PipelineError::Inference(Box::new(e)))?;
    drop(normalized);

    advance(&mut stage, Stage::Decoding);
    let candidates = self
      .decoder
      .decode(&raw, original_width, original_height, &self.labels)?;

    advance(&mut stage, Stage::Suppressing);
    let boxes: Vec<BoxRect> = candidates.iter().map(|c| c.bbox).collect();
    let confidences: Vec<f32> = candidates.iter().map(|c| c.confidence).collect();
    let accepted = suppress(
      &boxes,
      &confidences,
      self.config.confidence_threshold,
      self.config.nms_threshold,
    );

    advance(&mut stage, Stage::Rendering);
    let labels: Vec<String> = candidates.iter().map(|c| c.label.clone()).collect();
    self.renderer.render(frame, &boxes, &accepted, &labels);
    let fps = rate.tick(now);
    self.renderer.draw_fps(frame, fps);

    advance(&mut stage, Stage::Done);
    debug!(
      "帧处理完成: {} 个候选, {} 个保留, FPS {:.2}",
      candidates.len(),
      accepted.len(),
      fps
    );

    Ok(FrameReport {
      candidates,
      accepted,
      fps,
    })
  }
}

fn advance(stage: &mut Stage, next: Stage) {
  debug_assert!(next > *stage, "阶段不能回退: {:?} -> {:?}", stage, next);
  trace!("{:?} -> {:?}", stage, next);
  *stage = next;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectionTensor, Model};
  use std::cell::RefCell;
  use std::convert::Infallible;

  struct Recording {
    output: DetectionTensor,
    seen: RefCell<Vec<(u32, u32)>>,
  }

  impl Model for Recording {
    type Input = RgbImage;
    type Output = DetectionTensor;
    type Error = Infallible;

    fn infer(&self, input: &RgbImage) -> Result<DetectionTensor, Infallible> {
      self.seen.borrow_mut().push(input.dimensions());
      Ok(self.output.clone())
    }
  }

  #[derive(Debug, Error)]
  #[error("npu busy")]
  struct Busy;

  struct Failing;

  impl Model for Failing {
    type Input = RgbImage;
    type Output = DetectionTensor;
    type Error = Busy;

    fn infer(&self, _: &RgbImage) -> Result<DetectionTensor, Busy> {
      Err(Busy)
    }
  }

  fn pipeline() -> FrameDetectionPipeline {
    let labels: ClassLabels = ["background", "person", "car"].into_iter().collect();
    FrameDetectionPipeline::new(
      DetectionConfig::default(),
      labels,
      Renderer::embedded().unwrap(),
    )
  }

  #[test]
  fn model_sees_normalized_frame_and_boxes_use_original_size() {
    let model = Recording {
      output: DetectionTensor::from_rows(&[
        vec![0.0, 1.0, 0.9, 0.1, 0.2, 0.5, 0.6],
        vec![0.0, 1.0, 0.8, 0.1, 0.2, 0.5, 0.6],
        vec![0.0, 2.0, 0.3, 0.6, 0.6, 0.9, 0.9],
      ]),
      seen: RefCell::new(Vec::new()),
    };
    let mut frame = RgbImage::new(1200, 900);
    let mut rate = RateEstimator::new();
    let report = pipeline()
      .process(&model, &mut frame, &mut rate, Instant::now())
      .unwrap();

    assert_eq!(model.seen.borrow().as_slice(), &[(600, 450)]);
    assert_eq!(frame.dimensions(), (1200, 900));
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.accepted, vec![0]);
    let bbox = report.candidates[0].bbox;
    assert_eq!((bbox.left, bbox.top, bbox.width, bbox.height), (120, 180, 480, 360));
    assert_eq!(report.detections().count(), 1);
  }

  #[test]
  fn stages_are_ordered() {
    let order = [
      Stage::Idle,
      Stage::Normalizing,
      Stage::Inferring,
      Stage::Decoding,
      Stage::Suppressing,
      Stage::Rendering,
      Stage::Done,
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]));

    let mut stage = Stage::Idle;
    for next in &order[1..] {
      advance(&mut stage, *next);
    }
    assert_eq!(stage, Stage::Done);
  }

  #[test]
  fn empty_frame_aborts_before_inference() {
    let model = Recording {
      output: DetectionTensor::default(),
      seen: RefCell::new(Vec::new()),
    };
    let mut frame = RgbImage::new(0, 0);
    let mut rate = RateEstimator::new();
    let err = pipeline()
      .process(&model, &mut frame, &mut rate, Instant::now())
      .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyFrame));
    assert_eq!(err.stage(), Stage::Idle);
    assert!(model.seen.borrow().is_empty());
    assert_eq!(rate.frames_since_sample(), 0);
  }

  #[test]
  fn inference_errors_are_surfaced() {
    let original = RgbImage::new(64, 64);
    let mut frame = original.clone();
    let mut rate = RateEstimator::new();
    let err = pipeline()
      .process(&Failing, &mut frame, &mut rate, Instant::now())
      .unwrap_err();
    assert!(matches!(err, PipelineError::Inference(_)));
    assert_eq!(err.stage(), Stage::Inferring);
    assert_eq!(frame, original);
  }

  #[test]
  fn class_mismatch_is_fatal_and_leaves_frame_untouched() {
    let model = Recording {
      output: DetectionTensor::from_rows(&[vec![0.0, 7.0, 0.9, 0.1, 0.1, 0.5, 0.5]]),
      seen: RefCell::new(Vec::new()),
    };
    let original = RgbImage::new(64, 64);
    let mut frame = original.clone();
    let mut rate = RateEstimator::new();
    let err = pipeline()
      .process(&model, &mut frame, &mut rate, Instant::now())
      .unwrap_err();
    assert!(matches!(
      err,
      PipelineError::Decode(DecodeError::ClassIndexOutOfRange { .. })
    ));
    assert_eq!(err.stage(), Stage::Decoding);
    assert_eq!(frame, original);
  }
}
