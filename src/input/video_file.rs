// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/video_file.rs - 视频文件输入
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

//! 视频文件输入
//!
//! 通过 `ffprobe` 获取视频尺寸与帧率，再由 `ffmpeg` 把视频解码为 rgb24
//! 原始帧写到标准输出，逐帧读取。
//!
//! # URL 格式
//!
//! - `video:///path/to/input.mp4`
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 与 ffprobe 命令行工具。

use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, RGB_CHANNELS},
  input::FrameSource,
};

#[derive(Error, Debug)]
pub enum VideoFileInputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法执行 {0} (请确保已安装): {1}")]
  ToolUnavailable(&'static str, std::io::Error),
  #[error("ffprobe 失败: {0}")]
  ProbeFailed(String),
  #[error("ffprobe 输出无效: {0}")]
  InvalidProbe(String),
  #[error("ffmpeg 解码失败: {0}")]
  DecoderFailed(String),
}

/// 视频流信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
  pub width: u32,
  pub height: u32,
  pub fps: Option<f64>,
}

fn parse_rate(rate: &str) -> Option<f64> {
  let (num, den) = rate.split_once('/').unwrap_or((rate, "1"));
  let num: f64 = num.trim().parse().ok()?;
  let den: f64 = den.trim().parse().ok()?;
  (num > 0.0 && den > 0.0).then(|| num / den)
}

pub(crate) fn parse_probe(json: &str) -> Result<VideoInfo, VideoFileInputError> {
  let value: serde_json::Value =
    serde_json::from_str(json).map_err(|e| VideoFileInputError::InvalidProbe(e.to_string()))?;
  let stream = value
    .get("streams")
    .and_then(|s| s.get(0))
    .ok_or_else(|| VideoFileInputError::InvalidProbe("找不到视频流".to_string()))?;

  let dimension = |key: &str| {
    stream
      .get(key)
      .and_then(serde_json::Value::as_u64)
      .filter(|&v| v > 0 && v <= u32::MAX as u64)
      .map(|v| v as u32)
      .ok_or_else(|| VideoFileInputError::InvalidProbe(format!("缺少 {}", key)))
  };

  Ok(VideoInfo {
    width: dimension("width")?,
    height: dimension("height")?,
    fps: stream
      .get("avg_frame_rate")
      .and_then(serde_json::Value::as_str)
      .and_then(parse_rate),
  })
}

fn probe(path: &str) -> Result<VideoInfo, VideoFileInputError> {
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-select_streams", "v:0"])
    .args(["-show_entries", "stream=width,height,avg_frame_rate"])
    .args(["-of", "json"])
    .arg(path)
    .output()
    .map_err(|e| VideoFileInputError::ToolUnavailable("ffprobe", e))?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    error!("ffprobe 错误: {}", stderr);
    return Err(VideoFileInputError::ProbeFailed(stderr.into_owned()));
  }

  parse_probe(&String::from_utf8_lossy(&output.stdout))
}

pub struct VideoFileInput {
  child: Child,
  stdout: Option<ChildStdout>,
  info: VideoInfo,
  frame_index: u64,
  error: Option<VideoFileInputError>,
}

impl FromUrlWithScheme for VideoFileInput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for VideoFileInput {
  type Error = VideoFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(VideoFileInputError::SchemeMismatch(format!(
        "期望读取方式 '{}', 实际读取方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = url.path();
    let info = probe(path)?;
    info!(
      "打开视频文件: {} ({}x{}, {:?} fps)",
      path, info.width, info.height, info.fps
    );

    Self::spawn(decoder_command(path), info)
  }
}

/// 以 rgb24 原始帧输出到标准输出的解码命令
///
/// ffprobe 报告的是编码尺寸，关闭自动旋转以保证帧尺寸一致。
fn decoder_command(path: &str) -> Command {
  let mut command = Command::new("ffmpeg");
  command
    .args(["-loglevel", "error", "-nostdin", "-noautorotate"])
    .arg("-i")
    .arg(path)
    .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
  command
}

impl VideoFileInput {
  fn spawn(mut command: Command, info: VideoInfo) -> Result<Self, VideoFileInputError> {
    let mut child = command
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .spawn()
      .map_err(|e| VideoFileInputError::ToolUnavailable("ffmpeg", e))?;
    let stdout = child.stdout.take();

    Ok(VideoFileInput {
      child,
      stdout,
      info,
      frame_index: 0,
      error: None,
    })
  }

  /// 读到结尾后回收解码进程，记录非正常退出
  fn end_of_stream(&mut self, read_error: Option<std::io::Error>) {
    self.stdout = None;
    if read_error.is_some() {
      let _ = self.child.kill();
    }
    let status = match self.child.wait() {
      Ok(status) => status,
      Err(e) => {
        self.error = Some(e.into());
        return;
      }
    };
    if let Some(e) = read_error {
      warn!("读取视频帧失败，结束输入: {}", e);
      self.error = Some(e.into());
    } else if !status.success() {
      error!("ffmpeg 解码失败: {}", status);
      self.error = Some(VideoFileInputError::DecoderFailed(status.to_string()));
    } else {
      debug!("视频读取结束，共 {} 帧", self.frame_index);
    }
  }

  pub fn info(&self) -> VideoInfo {
    self.info
  }

  fn frame_len(&self) -> usize {
    self.info.width as usize * self.info.height as usize * RGB_CHANNELS
  }

  fn timestamp_ms(&self) -> u64 {
    match self.info.fps {
      Some(fps) => (self.frame_index as f64 * 1000.0 / fps) as u64,
      None => 0,
    }
  }
}

impl Iterator for VideoFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let len = self.frame_len();
    let stdout = self.stdout.as_mut()?;
    let mut data = vec![0u8; len];

    if let Err(e) = stdout.read_exact(&mut data) {
      let read_error = (e.kind() != ErrorKind::UnexpectedEof).then_some(e);
      self.end_of_stream(read_error);
      return None;
    }

    // 长度已由 read_exact 保证
    let image = RgbImage::from_raw(self.info.width, self.info.height, data)?;
    let frame = Frame::new(image, self.frame_index, self.timestamp_ms());
    self.frame_index += 1;
    Some(frame)
  }
}

impl FrameSource for VideoFileInput {
  type Error = VideoFileInputError;

  /// 提前结束时终止解码进程；读到结尾时返回解码过程中的错误
  fn finish(&mut self) -> Result<(), Self::Error> {
    if self.stdout.take().is_some() {
      if let Err(e) = self.child.kill() {
        debug!("ffmpeg 进程已退出: {}", e);
      }
      self.child.wait()?;
      return Ok(());
    }
    match self.error.take() {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}

impl Drop for VideoFileInput {
  fn drop(&mut self) {
    if self.stdout.take().is_some() {
      if let Err(e) = self.child.kill() {
        debug!("ffmpeg 进程已退出: {}", e);
      }
      let _ = self.child.wait();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_probe_output() {
    let json = r#"{"programs":[],"streams":[{"width":1920,"height":1080,"avg_frame_rate":"30000/1001"}]}"#;
    let info = parse_probe(json).unwrap();
    assert_eq!((info.width, info.height), (1920, 1080));
    assert!((info.fps.unwrap() - 29.97).abs() < 0.01);
  }

  #[test]
  fn unknown_frame_rate_is_none() {
    let json = r#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"0/0"}]}"#;
    assert_eq!(parse_probe(json).unwrap().fps, None);
  }

  #[test]
  fn missing_stream_is_invalid() {
    assert!(matches!(
      parse_probe(r#"{"streams":[]}"#),
      Err(VideoFileInputError::InvalidProbe(_))
    ));
    assert!(matches!(
      parse_probe(r#"{"streams":[{"width":0,"height":480}]}"#),
      Err(VideoFileInputError::InvalidProbe(_))
    ));
  }

  fn shell(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.args(["-c", script]);
    command
  }

  fn info_2x2() -> VideoInfo {
    VideoInfo {
      width: 2,
      height: 2,
      fps: Some(10.0),
    }
  }

  #[test]
  fn decoder_failure_is_reported_by_finish() {
    let mut input = VideoFileInput::spawn(shell("exit 3"), info_2x2()).unwrap();
    assert!(input.next().is_none());
    assert!(matches!(
      input.finish(),
      Err(VideoFileInputError::DecoderFailed(_))
    ));
  }

  #[test]
  fn clean_end_of_stream_finishes_ok() {
    let mut input = VideoFileInput::spawn(shell("head -c 24 /dev/zero"), info_2x2()).unwrap();
    let first = input.next().unwrap();
    assert_eq!((first.index, first.timestamp_ms), (0, 0));
    let second = input.next().unwrap();
    assert_eq!((second.index, second.timestamp_ms), (1, 100));
    assert!(input.next().is_none());
    input.finish().unwrap();
  }

  #[test]
  fn failure_after_some_frames_is_still_reported() {
    let mut input =
      VideoFileInput::spawn(shell("head -c 12 /dev/zero; exit 1"), info_2x2()).unwrap();
    assert!(input.next().is_some());
    assert!(input.next().is_none());
    assert!(input.finish().is_err());
  }

  #[test]
  fn stopping_early_is_not_an_error() {
    let mut input = VideoFileInput::spawn(shell("cat /dev/zero"), info_2x2()).unwrap();
    assert!(input.next().is_some());
    input.finish().unwrap();
  }

  #[test]
  fn decoder_keeps_coded_orientation() {
    let command = decoder_command("/tmp/portrait.mp4");
    assert!(command.get_args().any(|arg| arg == "-noautorotate"));
  }

  #[test]
  fn parses_plain_rates() {
    assert_eq!(parse_rate("25"), Some(25.0));
    assert_eq!(parse_rate("25/1"), Some(25.0));
    assert_eq!(parse_rate("abc"), None);
  }
}
