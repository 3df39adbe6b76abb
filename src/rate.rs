// 该文件是 Shanan （山南西风） 项目的一部分。
// src/rate.rs - 滚动帧率估计
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

use std::time::{Duration, Instant};

use tracing::debug;

const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// 以 1 秒为窗口的滚动帧率
///
/// 每个会话持有一个实例，并在每帧处理时以 `&mut` 传入流水线。
/// 窗口之间保留上一次的帧率，叠加显示不会闪回 0。
#[derive(Debug, Clone)]
pub struct RateEstimator {
  last_sample: Instant,
  frames_since_sample: u32,
  fps: f64,
}

impl Default for RateEstimator {
  fn default() -> Self {
    Self::new()
  }
}

impl RateEstimator {
  pub fn new() -> Self {
    Self::starting_at(Instant::now())
  }

  pub fn starting_at(now: Instant) -> Self {
    Self {
      last_sample: now,
      frames_since_sample: 0,
      fps: 0.0,
    }
  }

  /// 记录一帧，返回当前帧率
  pub fn tick(&mut self, now: Instant) -> f64 {
    self.frames_since_sample += 1;
    // 按整毫秒计时
    let elapsed_ms = now.saturating_duration_since(self.last_sample).as_millis();
    if elapsed_ms >= SAMPLE_WINDOW.as_millis() {
      let elapsed = elapsed_ms as f64 / 1000.0;
      self.fps = self.frames_since_sample as f64 / elapsed;
      debug!(
        "帧率更新: {} 帧 / {:.3} 秒 = {:.2}",
        self.frames_since_sample, elapsed, self.fps
      );
      self.frames_since_sample = 0;
      self.last_sample = now;
    }
    self.fps
  }

  pub fn fps(&self) -> f64 {
    self.fps
  }

  pub fn frames_since_sample(&self) -> u32 {
    self.frames_since_sample
  }
}
