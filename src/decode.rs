// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode.rs - 检测输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::{
  labels::ClassLabels,
  model::{DETECTION_COLUMNS, DetectionTensor},
  suppress::BoxRect,
};

const COL_CLASS: usize = 1;
const COL_CONFIDENCE: usize = 2;
const COL_LEFT: usize = 3;
const COL_TOP: usize = 4;
const COL_RIGHT: usize = 5;
const COL_BOTTOM: usize = 6;

/// 置信度在标签中保留的字符数
const CONFIDENCE_CHARS: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("类别索引 {index} 超出类别列表范围 (共 {classes} 个)")]
  ClassIndexOutOfRange { index: f32, classes: usize },
  #[error("检测输出列数不足: 期望至少 {expected}, 实际 {actual}")]
  TooFewColumns { expected: usize, actual: usize },
}

/// 解码后的候选检测，坐标位于原图像素空间
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub class_index: usize,
  pub confidence: f32,
  pub bbox: BoxRect,
  pub label: String,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionDecoder {
  confidence_threshold: f32,
}

impl DetectionDecoder {
  pub fn new(confidence_threshold: f32) -> Self {
    Self {
      confidence_threshold,
    }
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn decode(
    &self,
    raw: &DetectionTensor,
    original_width: u32,
    original_height: u32,
    class_names: &ClassLabels,
  ) -> Result<Vec<Candidate>, DecodeError> {
    if raw.rows() > 0 && raw.cols() < DETECTION_COLUMNS {
      return Err(DecodeError::TooFewColumns {
        expected: DETECTION_COLUMNS,
        actual: raw.cols(),
      });
    }

    let w = original_width as f32;
    let h = original_height as f32;
    let mut candidates = Vec::new();

    for row in raw.iter_rows() {
      let confidence = row[COL_CONFIDENCE];
      if confidence.is_nan() || confidence < self.confidence_threshold {
        continue;
      }

      let class_value = row[COL_CLASS];
      let class_index = class_index(class_value, class_names.len())?;
      let name = class_names
        .get(class_index)
        .ok_or(DecodeError::ClassIndexOutOfRange {
          index: class_value,
          classes: class_names.len(),
        })?;

      let left = (row[COL_LEFT] * w) as i32;
      let top = (row[COL_TOP] * h) as i32;
      let right = (row[COL_RIGHT] * w) as i32;
      let bottom = (row[COL_BOTTOM] * h) as i32;

      candidates.push(Candidate {
        class_index,
        confidence,
        bbox: BoxRect::from_corners(left, top, right, bottom),
        label: make_label(name, confidence),
      });
    }

    debug!("解码得到 {} 个候选 (共 {} 行)", candidates.len(), raw.rows());
    Ok(candidates)
  }
}

fn class_index(value: f32, classes: usize) -> Result<usize, DecodeError> {
  let truncated = value.trunc();
  if !truncated.is_finite() || truncated < 0.0 || truncated as usize >= classes {
    return Err(DecodeError::ClassIndexOutOfRange {
      index: value,
      classes,
    });
  }
  Ok(truncated as usize)
}

/// 首字母大写的类别名 + ":" + 置信度的前 4 个字符（六位小数格式）
pub fn make_label(class_name: &str, confidence: f32) -> String {
  let mut chars = class_name.chars();
  let mut label: String = match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  };
  label.push(':');
  label.push_str(&truncated_decimal(confidence as f64, CONFIDENCE_CHARS));
  label
}

/// 以六位小数格式化后截取前 `chars` 个字符，不做四舍五入
pub fn truncated_decimal(value: f64, chars: usize) -> String {
  format!("{:.6}", value).chars().take(chars).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels() -> ClassLabels {
    ["background", "person", "car"].into_iter().collect()
  }

  fn row(class: f32, confidence: f32, bbox: [f32; 4]) -> Vec<f32> {
    vec![0.0, class, confidence, bbox[0], bbox[1], bbox[2], bbox[3]]
  }

  #[test]
  fn reprojects_onto_original_frame() {
    let raw = DetectionTensor::from_rows(&[row(1.0, 0.9, [0.1, 0.2, 0.5, 0.6])]);
    let candidates = DetectionDecoder::new(0.5)
      .decode(&raw, 640, 480, &labels())
      .unwrap();
    assert_eq!(candidates.len(), 1);
    let bbox = candidates[0].bbox;
    assert_eq!((bbox.left, bbox.top), (64, 96));
    assert_eq!((bbox.right(), bbox.bottom()), (320, 288));
    assert_eq!((bbox.width, bbox.height), (256, 192));
    assert_eq!(candidates[0].class_index, 1);
  }

  #[test]
  fn threshold_is_inclusive() {
    let threshold = 0.5f32;
    let below = f32::from_bits(threshold.to_bits() - 1);
    let raw = DetectionTensor::from_rows(&[
      row(1.0, threshold, [0.0, 0.0, 0.5, 0.5]),
      row(2.0, below, [0.0, 0.0, 0.5, 0.5]),
      row(2.0, f32::NAN, [0.0, 0.0, 0.5, 0.5]),
    ]);
    let candidates = DetectionDecoder::new(threshold)
      .decode(&raw, 100, 100, &labels())
      .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_index, 1);
  }

  #[test]
  fn degenerate_boxes_pass_through() {
    let raw = DetectionTensor::from_rows(&[row(2.0, 0.8, [0.5, 0.5, 0.25, 0.25])]);
    let candidates = DetectionDecoder::new(0.5)
      .decode(&raw, 100, 100, &labels())
      .unwrap();
    assert_eq!(candidates[0].bbox.width, -25);
    assert_eq!(candidates[0].bbox.height, -25);
  }

  #[test]
  fn out_of_range_coordinates_saturate() {
    let raw = DetectionTensor::from_rows(&[
      row(1.0, 0.9, [-3e9, 0.0, 3e9, 1.0]),
      row(2.0, 0.9, [3e9, -3e9, -3e9, 3e9]),
    ]);
    let candidates = DetectionDecoder::new(0.5)
      .decode(&raw, 640, 480, &labels())
      .unwrap();
    assert_eq!(candidates.len(), 2);
    let wide = candidates[0].bbox;
    assert_eq!((wide.left, wide.width), (i32::MIN, i32::MAX));
    assert!(candidates[1].bbox.is_degenerate());
  }

  #[test]
  fn class_index_is_truncated() {
    let raw = DetectionTensor::from_rows(&[row(2.7, 0.8, [0.0, 0.0, 1.0, 1.0])]);
    let candidates = DetectionDecoder::new(0.5)
      .decode(&raw, 10, 10, &labels())
      .unwrap();
    assert_eq!(candidates[0].class_index, 2);
    assert_eq!(candidates[0].label, "Car:0.80");
  }

  #[test]
  fn out_of_range_class_fails_fast() {
    for class in [3.0, -1.0, f32::INFINITY] {
      let raw = DetectionTensor::from_rows(&[row(class, 0.9, [0.0, 0.0, 1.0, 1.0])]);
      let err = DetectionDecoder::new(0.5)
        .decode(&raw, 10, 10, &labels())
        .unwrap_err();
      assert!(matches!(err, DecodeError::ClassIndexOutOfRange { classes: 3, .. }));
    }
  }

  #[test]
  fn rows_below_threshold_never_check_class() {
    let raw = DetectionTensor::from_rows(&[row(99.0, 0.1, [0.0, 0.0, 1.0, 1.0])]);
    let candidates = DetectionDecoder::new(0.5)
      .decode(&raw, 10, 10, &labels())
      .unwrap();
    assert!(candidates.is_empty());
  }

  #[test]
  fn narrow_tensor_is_rejected() {
    let raw = DetectionTensor::new(5, vec![0.0; 10]);
    let err = DetectionDecoder::new(0.5)
      .decode(&raw, 10, 10, &labels())
      .unwrap_err();
    assert_eq!(
      err,
      DecodeError::TooFewColumns {
        expected: 7,
        actual: 5
      }
    );
  }

  #[test]
  fn label_formatting() {
    assert_eq!(make_label("person", 0.87), "Person:0.87");
    assert_eq!(make_label("person", 0.8765), "Person:0.87");
    assert_eq!(make_label("dog", 1.0), "Dog:1.00");
    assert_eq!(make_label("éclair", 0.95), "Éclair:0.95");
    assert_eq!(make_label("", 0.5), ":0.50");
  }

  #[test]
  fn truncated_decimal_does_not_round() {
    assert_eq!(truncated_decimal(29.97, 5), "29.97");
    assert_eq!(truncated_decimal(0.0, 5), "0.000");
    assert_eq!(truncated_decimal(123.456, 5), "123.4");
    assert_eq!(truncated_decimal(0.999, 4), "0.99");
  }
}
