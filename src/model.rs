// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

/// SSD 检测输出每行的最少列数：
/// [image_id, class_id, confidence, left, top, right, bottom]
pub const DETECTION_COLUMNS: usize = 7;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 固定排布的检测输出，行优先存储
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTensor {
  cols: usize,
  data: Vec<f32>,
}

impl Default for DetectionTensor {
  fn default() -> Self {
    Self::new(DETECTION_COLUMNS, Vec::new())
  }
}

impl DetectionTensor {
  /// 按列数切分数据；不足一整行的尾部数据被丢弃
  pub fn new(cols: usize, mut data: Vec<f32>) -> Self {
    let cols = cols.max(1);
    let whole = data.len() / cols * cols;
    data.truncate(whole);
    Self { cols, data }
  }

  pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Self {
    let cols = rows
      .iter()
      .map(|row| row.as_ref().len())
      .max()
      .unwrap_or(DETECTION_COLUMNS);
    let mut data = Vec::with_capacity(rows.len() * cols);
    for row in rows {
      let row = row.as_ref();
      data.extend_from_slice(row);
      data.extend(std::iter::repeat_n(0.0, cols - row.len()));
    }
    Self::new(cols, data)
  }

  pub fn rows(&self) -> usize {
    self.data.len() / self.cols
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn row(&self, index: usize) -> &[f32] {
    &self.data[index * self.cols..(index + 1) * self.cols]
  }

  pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
    self.data.chunks_exact(self.cols)
  }
}

/// 检测模型：输入为归一化后的网络输入帧，输出为检测网格
pub trait DetectionModel: Model<Input = RgbImage, Output = DetectionTensor> {}

impl<M: Model<Input = RgbImage, Output = DetectionTensor>> DetectionModel for M {}

#[cfg(feature = "rknn")]
mod ssd_rknn;
#[cfg(feature = "rknn")]
pub use self::ssd_rknn::{SsdRknn, SsdRknnBuilder, SsdRknnError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tensor_drops_partial_rows() {
    let tensor = DetectionTensor::new(7, (0..16).map(|v| v as f32).collect());
    assert_eq!(tensor.rows(), 2);
    assert_eq!(tensor.row(1)[0], 7.0);
    assert_eq!(tensor.iter_rows().count(), 2);
  }

  #[test]
  fn from_rows_pads_short_rows() {
    let tensor = DetectionTensor::from_rows(&[vec![1.0; 7], vec![2.0; 5]]);
    assert_eq!(tensor.cols(), 7);
    assert_eq!(tensor.row(1), &[2.0, 2.0, 2.0, 2.0, 2.0, 0.0, 0.0]);
  }

  #[test]
  fn empty_rows_make_empty_tensor() {
    let rows: [Vec<f32>; 0] = [];
    let tensor = DetectionTensor::from_rows(&rows);
    assert_eq!(tensor.rows(), 0);
  }

  #[test]
  fn default_tensor_has_no_rows() {
    let tensor = DetectionTensor::default();
    assert_eq!((tensor.rows(), tensor.cols()), (0, DETECTION_COLUMNS));
    assert_eq!(tensor.iter_rows().count(), 0);
  }
}
