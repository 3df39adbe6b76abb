// 该文件是 Shanan （山南西风） 项目的一部分。
// src/render.rs - 检测结果与帧率可视化
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

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{decode::truncated_decimal, suppress::BoxRect};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 24.0; // 缩放系数 1.0 对应的像素字号
const LABEL_BOX_RATIO: f32 = 0.1; // 标签高度占检测框高度的目标比例
const LABEL_SCALE_MIN: f32 = 1.0;
const LABEL_SCALE_MAX: f32 = 3.0;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const FPS_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const FPS_MARGIN: i32 = 10;
const FPS_CHARS: usize = 5;

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/font.ttf");

#[derive(Error, Debug)]
pub enum FontLoadError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体数据无效")]
  InvalidFont,
}

/// 文本在某个缩放系数下的像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMetrics {
  pub width: u32,
  pub height: u32,
  /// 基线以下的像素高度
  pub baseline: u32,
}

/// 根据检测框高度计算标签缩放系数，限制在 [1, 3]
pub fn label_scale(box_height: i32, label_height: u32) -> f32 {
  if label_height == 0 {
    return LABEL_SCALE_MIN;
  }
  let raw = (box_height as f32 * LABEL_BOX_RATIO) / label_height as f32;
  raw.clamp(LABEL_SCALE_MIN, LABEL_SCALE_MAX)
}

pub struct Renderer {
  font: FontArc,
  font_size: f32,
}

impl Renderer {
  pub fn new(font: FontArc) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
    }
  }

  /// 使用内置字体
  pub fn embedded() -> Result<Self, FontLoadError> {
    let font = FontArc::try_from_slice(EMBEDDED_FONT).map_err(|_| FontLoadError::InvalidFont)?;
    Ok(Self::new(font))
  }

  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, FontLoadError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|_| FontLoadError::InvalidFont)?;
    Ok(Self::new(font))
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  fn px_scale(&self, scale: f32) -> PxScale {
    PxScale::from(self.font_size * scale)
  }

  fn ascent(&self, scale: f32) -> f32 {
    self.font.as_scaled(self.px_scale(scale)).ascent()
  }

  /// 测量文本尺寸
  pub fn measure(&self, text: &str, scale: f32) -> TextMetrics {
    let px = self.px_scale(scale);
    let (width, height) = text_size(px, &self.font, text);
    let descent = self.font.as_scaled(px).descent();
    TextMetrics {
      width,
      height,
      baseline: (-descent).ceil().max(0.0) as u32,
    }
  }

  /// 在原图上绘制保留下来的检测框和标签
  pub fn render(
    &self,
    frame: &mut RgbImage,
    boxes: &[BoxRect],
    accepted: &[usize],
    labels: &[String],
  ) {
    for &index in accepted {
      let (Some(bbox), Some(label)) = (boxes.get(index), labels.get(index)) else {
        continue;
      };
      if bbox.is_degenerate() {
        debug!("跳过退化检测框: {:?}", bbox);
        continue;
      }
      self.draw_box(frame, bbox);
      self.draw_label(frame, bbox, label);
    }
  }

  fn draw_box(&self, frame: &mut RgbImage, bbox: &BoxRect) {
    // 画面外的边收拢到紧贴画面之外，线宽向内绘制时仍不可见
    let margin = BOX_THICKNESS as i64 + 1;
    let clip = |v: i32, extent: u32| (v as i64).clamp(-margin, extent as i64 + margin);
    let left = clip(bbox.left, frame.width());
    let top = clip(bbox.top, frame.height());
    let right = clip(bbox.right(), frame.width());
    let bottom = clip(bbox.bottom(), frame.height());

    for t in 0..BOX_THICKNESS as i64 {
      let width = right - left - 2 * t;
      let height = bottom - top - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at((left + t) as i32, (top + t) as i32).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(frame, rect, Rgb(BOX_COLOR));
    }
  }

  fn draw_label(&self, frame: &mut RgbImage, bbox: &BoxRect, label: &str) {
    let metrics = self.measure(label, 1.0);
    let scale = label_scale(bbox.height, metrics.height);

    let scaled_height = metrics.height as f32 * scale;
    let rect_width = (metrics.width as f32 * scale) as u32;
    let rect_height = (scaled_height + metrics.baseline as f32) as u32;
    // 标签背景紧贴检测框上沿向上延伸，超出画面部分自然裁剪
    let rect_top = bbox.top as i64 - rect_height as i64;
    let visible = (bbox.left as i64) < frame.width() as i64
      && bbox.left as i64 + rect_width as i64 > 0
      && rect_top < frame.height() as i64
      && (bbox.top as i64) > 0;
    if !visible {
      debug!("标签位于画面之外: {:?}", bbox);
      return;
    }
    let rect_top = rect_top as i32;

    if rect_width > 0 && rect_height > 0 {
      let rect = Rect::at(bbox.left, rect_top).of_size(rect_width, rect_height);
      draw_filled_rect_mut(frame, rect, Rgb(BOX_COLOR));
    }

    // 文本基线位于检测框上沿之上 baseline 像素处
    let text_y = bbox.top - metrics.baseline as i32 - self.ascent(scale).round() as i32;
    draw_text_mut(
      frame,
      Rgb(LABEL_TEXT_COLOR),
      bbox.left,
      text_y,
      self.px_scale(scale),
      &self.font,
      label,
    );
  }

  pub fn fps_text(fps: f64) -> String {
    format!("FPS: {}", truncated_decimal(fps, FPS_CHARS))
  }

  /// 在左上角叠加帧率文本
  pub fn draw_fps(&self, frame: &mut RgbImage, fps: f64) {
    let text = Self::fps_text(fps);
    let metrics = self.measure(&text, 1.0);
    let baseline_y = metrics.height as i32 + FPS_MARGIN;
    let text_y = baseline_y - self.ascent(1.0).round() as i32;
    draw_text_mut(
      frame,
      Rgb(FPS_COLOR),
      FPS_MARGIN,
      text_y,
      self.px_scale(1.0),
      &self.font,
      &text,
    );
  }
}
