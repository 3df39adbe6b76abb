// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/ssd_rknn.rs - RKNN 上的 SSD 检测模型
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

use image::{RgbImage, imageops::FilterType};
use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::AsNhwcFrame,
  model::{DETECTION_COLUMNS, DetectionTensor, Model},
};

const SSD_NUM_INPUTS: u32 = 1;
const SSD_DEFAULT_INPUT_SIZE: (u32, u32) = (300, 300);

pub struct SsdRknn {
  context: Context,
  input_width: u32,
  input_height: u32,
}

#[derive(Error, Debug)]
pub enum SsdRknnError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl SsdRknnError {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    SsdRknnError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct SsdRknnBuilder {
  model_path: String,
  input_size: (u32, u32),
  flags: InitFlags,
}

impl FromUrlWithScheme for SsdRknnBuilder {
  const SCHEME: &'static str = "ssd";
}

fn parse_size(value: &str) -> Option<(u32, u32)> {
  let (w, h) = value.split_once('x')?;
  let w = w.trim().parse().ok()?;
  let h = h.trim().parse().ok()?;
  (w > 0 && h > 0).then_some((w, h))
}

impl FromUrl for SsdRknnBuilder {
  type Error = SsdRknnError;

  /// `ssd:///path/to/model.rknn?size=300x300`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SsdRknnError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let input_size = match url.query_pairs().find(|(k, _)| k == "size") {
      Some((_, v)) => parse_size(&v)
        .ok_or_else(|| SsdRknnError::ModelPathError(format!("无效的输入尺寸: {}", v)))?,
      None => SSD_DEFAULT_INPUT_SIZE,
    };

    Ok(SsdRknnBuilder {
      model_path: url.path().to_string(),
      input_size,
      flags: InitFlags::default(),
    })
  }
}

impl SsdRknnBuilder {
  /// 推理后端选择通过 RKNN 初始化标志传入
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  /// 以 RKNN C 接口的 `RKNN_FLAG_*` 位组合选择后端，未知位被忽略
  pub fn flag_bits(self, bits: u32) -> Self {
    self.flags(InitFlags::from_bits_truncate(bits))
  }

  pub fn init_flags(&self) -> InitFlags {
    self.flags
  }

  pub fn build(self) -> Result<SsdRknn, SsdRknnError> {
    info!("加载模型文件: {}", self.model_path);
    info!("RKNN 初始化标志: {:#x}", self.flags.bits());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| SsdRknnError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| SsdRknnError::invalid("无法获取输出数量", e))?;

    if num_inputs != SSD_NUM_INPUTS {
      error!("预期模型输入数量为 {}, 实际为 {}", SSD_NUM_INPUTS, num_inputs);
      return Err(SsdRknnError::invalid(
        &format!("预期模型输入数量为 {}, 实际为 {}", SSD_NUM_INPUTS, num_inputs),
        rknpu::Error::InvalidModel,
      ));
    }
    if num_outputs == 0 {
      error!("模型没有输出");
      return Err(SsdRknnError::invalid(
        "模型没有输出",
        rknpu::Error::InvalidModel,
      ));
    }

    debug!("模型输入数量: {}, 输出数量: {}", num_inputs, num_outputs);
    info!(
      "模型加载完成，输入尺寸 {}x{}",
      self.input_size.0, self.input_size.1
    );

    Ok(SsdRknn {
      context,
      input_width: self.input_size.0,
      input_height: self.input_size.1,
    })
  }
}

impl Model for SsdRknn {
  type Input = RgbImage;
  type Output = DetectionTensor;
  type Error = SsdRknnError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    // 网络输入尺寸固定，检测坐标是归一化的，所以这里直接拉伸即可
    let resized;
    let tensor = if input.dimensions() == (self.input_width, self.input_height) {
      input
    } else {
      resized = image::imageops::resize(
        input,
        self.input_width,
        self.input_height,
        FilterType::Triangle,
      );
      &resized
    };

    debug!("设置模型输入");
    self.context.set_input(
      0,
      tensor.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let data = output.get_f32(0)?;
    debug!("检测输出长度: {}", data.len());

    Ok(DetectionTensor::new(DETECTION_COLUMNS, data.to_vec()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_input_size() {
    assert_eq!(parse_size("300x300"), Some((300, 300)));
    assert_eq!(parse_size("320x240"), Some((320, 240)));
    assert_eq!(parse_size("0x240"), None);
    assert_eq!(parse_size("320"), None);
  }

  #[test]
  fn flag_bits_reach_the_builder() {
    let url = Url::parse("ssd:///tmp/model.rknn").unwrap();
    let builder = SsdRknnBuilder::from_url(&url).unwrap();
    assert_eq!(builder.init_flags().bits(), InitFlags::default().bits());
    let builder = builder.flag_bits(0);
    assert_eq!(builder.init_flags().bits(), 0);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("yolo:///tmp/model.rknn").unwrap();
    assert!(matches!(
      SsdRknnBuilder::from_url(&url),
      Err(SsdRknnError::ModelPathError(_))
    ));
  }
}
