// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 检测参数配置
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

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_LONG_EDGE: u32 = 600;

/// 单帧检测流水线的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
  /// 置信度阈值（含边界）
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub nms_threshold: f32,
  /// 网络输入帧的长边上限
  pub long_edge: u32,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      long_edge: DEFAULT_LONG_EDGE,
    }
  }
}

impl DetectionConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn with_long_edge(mut self, long_edge: u32) -> Self {
    self.long_edge = long_edge;
    self
  }
}
