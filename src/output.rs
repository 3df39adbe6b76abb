// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 接收已标注的原始分辨率帧并持久化
pub trait FrameSink {
  type Error;
  fn write_frame(&self, frame: &RgbImage) -> Result<(), Self::Error>;

  /// 结束输出；默认无事可做
  fn finish(&self) -> Result<(), Self::Error> {
    Ok(())
  }
}

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "video_file")]
mod save_video_file;
#[cfg(feature = "video_file")]
pub use self::save_video_file::{SaveVideoFileError, SaveVideoFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "video_file")]
  #[error("保存视频文件错误: {0}")]
  SaveVideoFileError(#[from] SaveVideoFileError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "video_file")]
  SaveVideoFileOutput(SaveVideoFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "video_file")]
      SaveVideoFileOutput::SCHEME => {
        let output = SaveVideoFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveVideoFileOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl FrameSink for OutputWrapper {
  type Error = OutputError;

  fn write_frame(&self, frame: &RgbImage) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => {
        output.write_frame(frame).map_err(OutputError::from)
      }
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => {
        output.write_frame(frame).map_err(OutputError::from)
      }
    }
  }

  fn finish(&self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.finish().map_err(OutputError::from),
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => output.finish().map_err(OutputError::from),
    }
  }
}
