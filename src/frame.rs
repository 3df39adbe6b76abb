// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

pub const RGB_CHANNELS: usize = 3;

/// 媒体源产生的一帧
#[derive(Debug, Clone)]
pub struct Frame {
  /// 原始分辨率的 RGB 图像
  pub image: RgbImage,
  /// 帧索引（从 0 开始）
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 宽或高为 0 的帧视为空帧
  pub fn is_empty(&self) -> bool {
    is_empty_image(&self.image)
  }
}

pub fn is_empty_image(image: &RgbImage) -> bool {
  image.width() == 0 || image.height() == 0
}

/// 以 NHWC 排布暴露像素数据，供推理后端直接拷贝
pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

impl AsNhwcFrame for RgbImage {
  fn as_nhwc(&self) -> &[u8] {
    // RgbImage 本身就是行优先、通道交错存储
    self.as_raw()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn empty_frame_detection() {
    assert!(Frame::new(RgbImage::new(0, 10), 0, 0).is_empty());
    assert!(Frame::new(RgbImage::new(10, 0), 0, 0).is_empty());
    assert!(!Frame::new(RgbImage::new(1, 1), 0, 0).is_empty());
  }

  #[test]
  fn nhwc_layout_is_interleaved() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(1, 0, Rgb([7, 8, 9]));
    let data = image.as_nhwc();
    assert_eq!(data.len(), 2 * RGB_CHANNELS);
    assert_eq!(&data[3..6], &[7, 8, 9]);
  }
}
