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

use std::{
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

mod synthetic;
pub use self::synthetic::{SyntheticInput, SyntheticInputError};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

/// 外部帧源，按源自身的节奏阻塞产出帧
pub trait FrameSource: Send + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `Ok(None)` 表示输入结束
  fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Synthetic input error: {0}")]
  SyntheticInputError(#[from] SyntheticInputError),
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  Synthetic(SyntheticInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() == SyntheticInput::SCHEME {
      return Ok(InputWrapper::Synthetic(SyntheticInput::from_url(url)?));
    }
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl FrameSource for InputWrapper {
  type Error = InputError;

  fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    match self {
      InputWrapper::Synthetic(input) => input.next_frame().map_err(InputError::from),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next_frame().map_err(InputError::from),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next_frame().map_err(InputError::from),
    }
  }
}

/// 按固定帧率放行
#[derive(Debug, Clone)]
pub(crate) struct Pacer {
  interval: Option<Duration>,
  next: Option<Instant>,
}

impl Pacer {
  pub(crate) fn new(fps: f64) -> Self {
    let interval = (fps.is_finite() && fps > 0.0)
      .then(|| Duration::try_from_secs_f64(1.0 / fps).ok())
      .flatten();
    Self {
      interval,
      next: None,
    }
  }

  pub(crate) fn wait(&mut self) {
    let Some(interval) = self.interval else {
      return;
    };
    let now = Instant::now();
    let deadline = self.next.unwrap_or(now);
    if deadline > now {
      thread::sleep(deadline - now);
    }
    // 落后太多时不追帧
    self.next = Some(deadline.max(now) + interval);
  }
}

/// 读取 `key=value` 形式的数值查询参数
pub(crate) fn query_number<T: std::str::FromStr>(url: &Url, key: &str) -> Result<Option<T>, String> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v.parse::<T>().map(Some).map_err(|_| format!("{}={}", key, v)),
    None => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapper_picks_source_by_scheme() {
    let url = Url::parse("synthetic://test?width=64&height=48&frames=2&fps=0").unwrap();
    let mut input = InputWrapper::from_url(&url).unwrap();
    let first = input.next_frame().unwrap().unwrap();
    assert_eq!((first.width(), first.height()), (64, 48));
    assert!(input.next_frame().unwrap().is_some());
    assert!(input.next_frame().unwrap().is_none());

    let url = Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }

  #[test]
  fn query_numbers() {
    let url = Url::parse("synthetic://test?fps=12.5&frames=x").unwrap();
    assert_eq!(query_number::<f64>(&url, "fps"), Ok(Some(12.5)));
    assert_eq!(query_number::<u32>(&url, "width"), Ok(None));
    assert!(query_number::<u64>(&url, "frames").is_err());
  }

  #[test]
  fn pacer_without_rate_never_sleeps() {
    let mut pacer = Pacer::new(0.0);
    let start = Instant::now();
    for _ in 0..1000 {
      pacer.wait();
    }
    assert!(start.elapsed() < Duration::from_millis(100));
  }
}
