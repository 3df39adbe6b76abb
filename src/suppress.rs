// 该文件是 Shanan （山南西风） 项目的一部分。
// src/suppress.rs - 置信度过滤与非极大值抑制
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

use tracing::debug;

/// 原图像素空间中的轴对齐矩形，宽高可能为负（退化框）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoxRect {
  pub left: i32,
  pub top: i32,
  pub width: i32,
  pub height: i32,
}

impl BoxRect {
  pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
    Self {
      left,
      top,
      width,
      height,
    }
  }

  /// 宽高饱和到 `i32` 范围内
  pub fn from_corners(left: i32, top: i32, right: i32, bottom: i32) -> Self {
    Self::new(
      left,
      top,
      right.saturating_sub(left),
      bottom.saturating_sub(top),
    )
  }

  // 坐标来自饱和转换，边界运算同样饱和，不回绕
  pub fn right(&self) -> i32 {
    self.left.saturating_add(self.width)
  }

  pub fn bottom(&self) -> i32 {
    self.top.saturating_add(self.height)
  }

  pub fn is_degenerate(&self) -> bool {
    self.width <= 0 || self.height <= 0
  }

  /// 面积；退化框面积为 0
  pub fn area(&self) -> f32 {
    if self.is_degenerate() {
      0.0
    } else {
      self.width as f32 * self.height as f32
    }
  }

  /// 交并比；任一方面积为 0 时为 0
  pub fn iou(&self, other: &BoxRect) -> f32 {
    let area_a = self.area();
    let area_b = other.area();
    if area_a <= 0.0 || area_b <= 0.0 {
      return 0.0;
    }

    let x1 = self.left.max(other.left);
    let y1 = self.top.max(other.top);
    let x2 = self.right().min(other.right());
    let y2 = self.bottom().min(other.bottom());

    let overlap = |lo: i32, hi: i32| (hi as i64 - lo as i64).max(0) as f32;
    let intersection = overlap(x1, x2) * overlap(y1, y2);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 贪心 NMS，返回保留下来的候选索引（按置信度从高到低）
///
/// 置信度相同的候选按原始顺序优先。
pub fn suppress(
  boxes: &[BoxRect],
  confidences: &[f32],
  confidence_threshold: f32,
  nms_threshold: f32,
) -> Vec<usize> {
  let mut order: Vec<usize> = (0..boxes.len().min(confidences.len()))
    .filter(|&i| confidences[i] >= confidence_threshold)
    .collect();
  // sort_by 是稳定排序
  order.sort_by(|&a, &b| confidences[b].total_cmp(&confidences[a]));

  let mut accepted = Vec::new();
  let mut suppressed = vec![false; boxes.len()];

  for (pos, &best) in order.iter().enumerate() {
    if suppressed[best] {
      continue;
    }
    accepted.push(best);

    for &other in &order[pos + 1..] {
      if !suppressed[other] && boxes[best].iou(&boxes[other]) >= nms_threshold {
        suppressed[other] = true;
      }
    }
  }

  debug!("NMS: {} 个候选保留 {} 个", order.len(), accepted.len());
  accepted
}
