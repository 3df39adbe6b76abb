// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::FrameSource};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图片输入，迭代时只产生一帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    info!("读取图像文件: {}", path);
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;

    Ok(Self::from_image(image.into_rgb8()))
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Self {
    ImageFileInput { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| Frame::new(image, 0, 0))
  }
}

impl FrameSource for ImageFileInput {
  type Error = ImageFileInputError;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_exactly_one_frame() {
    let mut input = ImageFileInput::from_image(RgbImage::new(4, 3));
    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height(), frame.index), (4, 3, 0));
    assert!(input.next().is_none());
    input.finish().unwrap();
  }

  #[test]
  fn reads_png_from_disk() {
    let path = std::env::temp_dir().join(format!("shanan-ssd-input-{}.png", std::process::id()));
    RgbImage::from_pixel(5, 7, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    std::fs::remove_file(&path).unwrap();
    let frame = input.next().unwrap();
    assert_eq!(frame.image.dimensions(), (5, 7));
    assert_eq!(frame.image.get_pixel(2, 2), &image::Rgb([1, 2, 3]));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("video:///tmp/a.mp4").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
