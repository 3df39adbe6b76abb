// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_continueshot.rs - 视频逐帧检测
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

use std::{path::PathBuf, time::Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use shanan_ssd::{
  FromUrl,
  config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_LONG_EDGE, DEFAULT_NMS_THRESHOLD, DetectionConfig},
  input::InputWrapper,
  labels::ClassLabels,
  model::SsdRknnBuilder,
  output::OutputWrapper,
  pipeline::FrameDetectionPipeline,
  render::Renderer,
  task::{ContinuousTask, Task, install_interrupt_handler},
};

/// 视频逐帧 SSD 检测，Ctrl-C 结束
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// RKNN 模型，例如 ssd:///path/to/model.rknn?size=300x300
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 输入视频，例如 video:///path/to/input.mp4
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出视频，例如 video:///path/to/output.mp4?fps=25
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IoU 阈值
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 网络输入的最长边
  #[arg(long, default_value_t = DEFAULT_LONG_EDGE, value_name = "PIXELS")]
  pub long_edge: u32,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// RKNN 初始化标志位（RKNN_FLAG_*），用于选择推理后端；缺省使用默认标志
  #[arg(long, value_name = "BITS")]
  pub rknn_flags: Option<u32>,
  /// 标签字体文件，缺省使用内置字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let started = Instant::now();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("类别文件路径: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = match ClassLabels::from_path(&args.labels) {
    Ok(labels) => labels,
    Err(e) => {
      error!("{}", e);
      std::process::exit(1);
    }
  };
  let model = match SsdRknnBuilder::from_url(&args.model).and_then(|builder| {
    let builder = match args.rknn_flags {
      Some(bits) => builder.flag_bits(bits),
      None => builder,
    };
    builder.build()
  }) {
    Ok(model) => model,
    Err(e) => {
      error!("{}", e);
      std::process::exit(1);
    }
  };

  let renderer = match &args.font {
    Some(path) => Renderer::from_font_file(path)?,
    None => Renderer::embedded()?,
  };
  let config = DetectionConfig::default()
    .with_confidence_threshold(args.confidence)
    .with_nms_threshold(args.nms_threshold)
    .with_long_edge(args.long_edge);
  let pipeline = FrameDetectionPipeline::new(config, labels, renderer);

  let input = InputWrapper::from_url(&args.input)?;
  info!("输入类型: {:?}", input.kind());
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::new(pipeline)
    .with_frame_number(args.frame_number)
    .with_interrupt(install_interrupt_handler()?)
    .run_task(input, model, output)?;

  info!(
    "运行结束，RKNN 标志 {}, 总耗时: {:.2?}",
    args
      .rknn_flags
      .map_or_else(|| "默认".to_string(), |bits| format!("{:#x}", bits)),
    started.elapsed()
  );
  Ok(())
}
