// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/synthetic.rs - 合成帧输入
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

use std::{sync::Arc, time::Instant};

use thiserror::Error;
use tracing::error;
use url::Url;

use super::{FrameSource, Pacer, query_number};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameError, FrameSize},
};

#[derive(Error, Debug)]
pub enum SyntheticInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Invalid query parameter: {0}")]
  InvalidParameter(String),
  #[error("Invalid frame: {0}")]
  FrameError(#[from] FrameError),
}

/// `synthetic://test?width=800&height=600&fps=15&frames=100`
///
/// 产出全黑的帧，用于配合回放检测器离线运行。`frames` 缺省时不结束。
pub struct SyntheticInput {
  size: FrameSize,
  pixels: Arc<[u8]>,
  limit: Option<u64>,
  produced: u64,
  pacer: Pacer,
}

impl SyntheticInput {
  pub fn new(size: FrameSize, fps: f64, limit: Option<u64>) -> Self {
    Self {
      size,
      pixels: Arc::from(vec![0u8; size.rgb_len()]),
      limit,
      produced: 0,
      pacer: Pacer::new(fps),
    }
  }
}

impl FromUrlWithScheme for SyntheticInput {
  const SCHEME: &'static str = "synthetic";
}

impl FromUrl for SyntheticInput {
  type Error = SyntheticInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(SyntheticInputError::SchemeMismatch);
    }

    let width = query_number::<u32>(url, "width")
      .map_err(SyntheticInputError::InvalidParameter)?
      .unwrap_or(640);
    let height = query_number::<u32>(url, "height")
      .map_err(SyntheticInputError::InvalidParameter)?
      .unwrap_or(480);
    let fps = query_number::<f64>(url, "fps")
      .map_err(SyntheticInputError::InvalidParameter)?
      .unwrap_or(15.0);
    let limit = query_number::<u64>(url, "frames").map_err(SyntheticInputError::InvalidParameter)?;

    Ok(Self::new(FrameSize::new(width, height)?, fps, limit))
  }
}

impl FrameSource for SyntheticInput {
  type Error = SyntheticInputError;

  fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    if self.limit.is_some_and(|limit| self.produced >= limit) {
      return Ok(None);
    }
    self.pacer.wait();
    let frame = Frame::new(self.pixels.clone(), self.size, self.produced, Instant::now())?;
    self.produced += 1;
    Ok(Some(frame))
  }
}
