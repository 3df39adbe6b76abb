// 该文件是 Shanan （山南西风） 项目的一部分。
// src/normalize.rs - 网络输入帧尺寸归一化
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

//! 帧归一化
//!
//! 按长边上限缩放输入帧，并记录原始尺寸用于把检测框投影回原图。
//! 缩放规则是一张三分支的决策表（见 [`ResizePlan::decide`]），
//! 其中「正方形且超限」与「非正方形且超限」走不同分支，其余情况一律不缩放。

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

use crate::config::DEFAULT_LONG_EDGE;

/// 缩放决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
  /// 非正方形且主轴超限：长边缩放到上限，短边按比例缩放
  ScaleByLongEdge { width: u32, height: u32 },
  /// 正方形且边长超限：缩放为 上限 x 上限
  ScaleToSquare { edge: u32 },
  /// 不缩放，网络输入与原图共用同一缓冲区
  NoResize,
}

impl ResizePlan {
  pub fn decide(width: u32, height: u32, cap: u32) -> Self {
    if (width > cap && width > height) || (height > cap && height > width) {
      let (long, short) = if width > height {
        (width, height)
      } else {
        (height, width)
      };
      let scaled_short = ((cap as f64 * short as f64 / long as f64) as u32).max(1);
      if width > height {
        ResizePlan::ScaleByLongEdge {
          width: cap,
          height: scaled_short,
        }
      } else {
        ResizePlan::ScaleByLongEdge {
          width: scaled_short,
          height: cap,
        }
      }
    } else if height > cap && height == width {
      ResizePlan::ScaleToSquare { edge: cap }
    } else {
      ResizePlan::NoResize
    }
  }

  /// 目标尺寸；`NoResize` 时返回 None
  pub fn target(&self) -> Option<(u32, u32)> {
    match *self {
      ResizePlan::ScaleByLongEdge { width, height } => Some((width, height)),
      ResizePlan::ScaleToSquare { edge } => Some((edge, edge)),
      ResizePlan::NoResize => None,
    }
  }
}

/// 归一化结果
#[derive(Debug)]
pub struct NormalizedFrame<'a> {
  /// 送入网络的帧；不缩放时借用原图
  pub input: Cow<'a, RgbImage>,
  pub original_width: u32,
  pub original_height: u32,
  pub plan: ResizePlan,
}

impl NormalizedFrame<'_> {
  pub fn is_resized(&self) -> bool {
    matches!(self.input, Cow::Owned(_))
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameNormalizer {
  long_edge: u32,
}

impl Default for FrameNormalizer {
  fn default() -> Self {
    Self::new(DEFAULT_LONG_EDGE)
  }
}

impl FrameNormalizer {
  pub fn new(long_edge: u32) -> Self {
    Self { long_edge }
  }

  pub fn long_edge(&self) -> u32 {
    self.long_edge
  }

  pub fn normalize<'a>(&self, frame: &'a RgbImage) -> NormalizedFrame<'a> {
    let (original_width, original_height) = frame.dimensions();
    let plan = ResizePlan::decide(original_width, original_height, self.long_edge);

    let input = match plan.target() {
      Some((width, height)) => {
        debug!(
          "缩放输入帧: {}x{} -> {}x{} ({:?})",
          original_width, original_height, width, height, plan
        );
        Cow::Owned(image::imageops::resize(
          frame,
          width,
          height,
          FilterType::Triangle,
        ))
      }
      None => Cow::Borrowed(frame),
    };

    NormalizedFrame {
      input,
      original_width,
      original_height,
      plan,
    }
  }
}
