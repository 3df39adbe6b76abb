// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 逐帧产生输入；结束后由 `finish` 报告读取过程中的错误
pub trait FrameSource: Iterator<Item = Frame> {
  type Error;

  /// 结束输入；默认无事可做
  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "video_file")]
mod video_file;
#[cfg(feature = "video_file")]
pub use self::video_file::{VideoFileInput, VideoFileInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "video_file")]
  #[error("Video file input error: {0}")]
  VideoFileInputError(#[from] VideoFileInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
  /// 单张图片，只产生一帧
  Image,
  /// 视频文件，读到结尾为止
  Video,
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "video_file")]
  VideoFile(VideoFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      #[cfg(feature = "video_file")]
      VideoFileInput::SCHEME => Ok(InputWrapper::VideoFile(VideoFileInput::from_url(url)?)),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl InputWrapper {
  pub fn kind(&self) -> InputKind {
    match self {
      InputWrapper::ReadImageFile(_) => InputKind::Image,
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(_) => InputKind::Video,
    }
  }
}

impl FrameSource for InputWrapper {
  type Error = InputError;

  fn finish(&mut self) -> Result<(), Self::Error> {
    match self {
      InputWrapper::ReadImageFile(input) => input.finish().map_err(InputError::from),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.finish().map_err(InputError::from),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.next(),
    }
  }
}
