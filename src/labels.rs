// 该文件是 Shanan （山南西风） 项目的一部分。
// src/labels.rs - 类别标签列表
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelResourceError {
  #[error("无法读取类别文件 {path}: {source}")]
  Unreadable {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// 与模型类别输出按索引对齐的类别名称
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassLabels {
  names: Vec<String>,
}

impl ClassLabels {
  /// 从按行分隔的文本文件读取类别名称，每行一个
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelResourceError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| LabelResourceError::Unreadable {
      path: path.to_path_buf(),
      source,
    })?;
    let labels = Self::parse(&text);
    debug!("共 {} 个类别", labels.len());
    Ok(labels)
  }

  pub fn parse(text: &str) -> Self {
    // 与逐行读取一致：保留空行占位，仅去掉行尾的 \r
    let names = text
      .lines()
      .map(|line| line.trim_end_matches('\r').to_string())
      .collect();
    Self { names }
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }
}

impl<S: Into<String>> FromIterator<S> for ClassLabels {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}
