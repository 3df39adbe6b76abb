// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_video_file.rs - 保存视频文件
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

//! 视频文件输出模块
//!
//! 第一帧到达时才以该帧的尺寸启动 `ffmpeg` 编码进程，之后逐帧以 rgb24
//! 原始数据写入其标准输入。
//!
//! # URL 格式
//!
//! - `video:///path/to/output.mp4` - 指定输出视频路径，默认 25 fps
//! - `video:///path/to/output.mp4?fps=30` - 指定输出视频路径和帧率
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::cell::RefCell;
use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::FrameSink};

#[derive(Error, Debug)]
pub enum SaveVideoFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("视频编码错误: {0}")]
  EncodingError(String),
  #[error("参数验证错误: {0}")]
  ValidationError(String),
}

const DEFAULT_FPS: u32 = 25;
const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 120;

/// 正在运行的编码进程
struct Encoder {
  child: Child,
  stdin: Option<ChildStdin>,
  width: u32,
  height: u32,
  frames: u64,
}

impl Encoder {
  fn spawn(path: &str, width: u32, height: u32, fps: u32) -> Result<Self, SaveVideoFileError> {
    if let Some(parent) = Path::new(path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    info!("启动视频编码: {}x{} @ {} fps -> {}", width, height, fps, path);

    let mut child = Command::new("ffmpeg")
      .arg("-y") // 覆盖已存在的文件
      .args(["-loglevel", "error"])
      .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
      .arg("-s")
      .arg(format!("{}x{}", width, height))
      .arg("-framerate")
      .arg(fps.to_string())
      .args(["-i", "-"])
      .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
      .args(["-preset", "fast", "-crf", "23"])
      .arg(path)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| {
        error!("无法执行 ffmpeg: {}", e);
        SaveVideoFileError::EncodingError(format!("无法执行 ffmpeg (请确保已安装): {}", e))
      })?;
    let stdin = child.stdin.take();

    Ok(Encoder {
      child,
      stdin,
      width,
      height,
      frames: 0,
    })
  }

  fn push(&mut self, frame: &RgbImage) -> Result<(), SaveVideoFileError> {
    if frame.dimensions() != (self.width, self.height) {
      return Err(SaveVideoFileError::ValidationError(format!(
        "帧尺寸 {}x{} 与视频尺寸 {}x{} 不一致",
        frame.width(),
        frame.height(),
        self.width,
        self.height
      )));
    }
    let stdin = self
      .stdin
      .as_mut()
      .ok_or_else(|| SaveVideoFileError::EncodingError("编码器已关闭".to_string()))?;
    stdin.write_all(frame.as_raw())?;
    self.frames += 1;
    Ok(())
  }

  fn close(mut self) -> Result<u64, SaveVideoFileError> {
    // 关闭标准输入，ffmpeg 随后写完文件尾并退出
    drop(self.stdin.take());
    let output = self.child.wait_with_output()?;
    if output.status.success() {
      Ok(self.frames)
    } else {
      let stderr = String::from_utf8_lossy(&output.stderr);
      error!("ffmpeg 错误: {}", stderr);
      Err(SaveVideoFileError::EncodingError(format!(
        "ffmpeg 失败: {}",
        stderr
      )))
    }
  }
}

pub struct SaveVideoFileOutput {
  path: String,
  fps: u32,
  encoder: RefCell<Option<Encoder>>,
}

impl FromUrlWithScheme for SaveVideoFileOutput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for SaveVideoFileOutput {
  type Error = SaveVideoFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveVideoFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    // 从 URL 查询参数中获取 FPS（如果有的话）
    let fps = match uri.query_pairs().find(|(k, _)| k == "fps") {
      Some((_, v)) => v.parse::<u32>().map_err(|_| {
        SaveVideoFileError::ValidationError(format!("无效的 FPS: {}", v))
      })?,
      None => DEFAULT_FPS,
    };

    if !(MIN_FPS..=MAX_FPS).contains(&fps) {
      return Err(SaveVideoFileError::ValidationError(format!(
        "FPS {} 超出有效范围 [{}, {}]",
        fps, MIN_FPS, MAX_FPS
      )));
    }

    Ok(SaveVideoFileOutput {
      path: uri.path().to_string(),
      fps,
      encoder: RefCell::new(None),
    })
  }
}

impl SaveVideoFileOutput {
  pub fn fps(&self) -> u32 {
    self.fps
  }

  pub fn path(&self) -> &str {
    &self.path
  }
}

impl FrameSink for SaveVideoFileOutput {
  type Error = SaveVideoFileError;

  fn write_frame(&self, frame: &RgbImage) -> Result<(), Self::Error> {
    let mut encoder = self.encoder.borrow_mut();
    if encoder.is_none() {
      *encoder = Some(Encoder::spawn(
        &self.path,
        frame.width(),
        frame.height(),
        self.fps,
      )?);
    }
    match encoder.as_mut() {
      Some(encoder) => encoder.push(frame),
      None => Ok(()),
    }
  }

  fn finish(&self) -> Result<(), Self::Error> {
    match self.encoder.borrow_mut().take() {
      Some(encoder) => {
        let frames = encoder.close()?;
        info!("视频已保存到文件: {} ({} 帧)", self.path, frames);
        Ok(())
      }
      None => {
        info!("没有帧可以编码为视频，跳过编码过程");
        Ok(())
      }
    }
  }
}

impl Drop for SaveVideoFileOutput {
  fn drop(&mut self) {
    if self.encoder.borrow().is_some()
      && let Err(e) = self.finish()
    {
      error!("编码视频时出错: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_fps_is_25() {
    let url = Url::parse("video:///tmp/out.mp4").unwrap();
    let output = SaveVideoFileOutput::from_url(&url).unwrap();
    assert_eq!(output.fps(), 25);
    assert_eq!(output.path(), "/tmp/out.mp4");
  }

  #[test]
  fn fps_query_is_validated() {
    let url = Url::parse("video:///tmp/out.mp4?fps=30").unwrap();
    assert_eq!(SaveVideoFileOutput::from_url(&url).unwrap().fps(), 30);

    for bad in ["0", "500", "fast"] {
      let url = Url::parse(&format!("video:///tmp/out.mp4?fps={}", bad)).unwrap();
      assert!(matches!(
        SaveVideoFileOutput::from_url(&url),
        Err(SaveVideoFileError::ValidationError(_))
      ));
    }
  }

  #[test]
  fn finish_without_frames_is_a_no_op() {
    let url = Url::parse("video:///tmp/never-written.mp4").unwrap();
    let output = SaveVideoFileOutput::from_url(&url).unwrap();
    output.finish().unwrap();
    assert!(output.encoder.borrow().is_none());
  }
}
