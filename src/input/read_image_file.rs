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

use std::{sync::Arc, time::Instant};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use super::{FrameSource, Pacer, query_number};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameError, FrameSize},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid query parameter: {0}")]
  InvalidParameter(String),
  #[error("Invalid frame: {0}")]
  FrameError(#[from] FrameError),
}

/// `image:///path/to/picture.png?fps=10&frames=30`
///
/// 把同一张图片按给定帧率重复 `frames` 次（缺省 1 次）。
pub struct ImageFileInput {
  pixels: Arc<[u8]>,
  size: FrameSize,
  repeat: u64,
  produced: u64,
  pacer: Pacer,
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage, fps: f64, repeat: u64) -> Result<Self, ImageFileInputError> {
    let (width, height) = image.dimensions();
    let size = FrameSize::new(width, height)?;
    Ok(Self {
      pixels: Arc::from(image.into_raw()),
      size,
      repeat,
      produced: 0,
      pacer: Pacer::new(fps),
    })
  }
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

    let fps = query_number::<f64>(url, "fps")
      .map_err(ImageFileInputError::InvalidParameter)?
      .unwrap_or(0.0);
    let repeat = query_number::<u64>(url, "frames")
      .map_err(ImageFileInputError::InvalidParameter)?
      .unwrap_or(1);

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?;
    info!("读取图像 {} ({}x{})", path, image.width(), image.height());

    Self::from_image(image.into_rgb8(), fps, repeat)
  }
}

impl FrameSource for ImageFileInput {
  type Error = ImageFileInputError;

  fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    if self.produced >= self.repeat {
      return Ok(None);
    }
    self.pacer.wait();
    let frame = Frame::new(self.pixels.clone(), self.size, self.produced, Instant::now())?;
    self.produced += 1;
    Ok(Some(frame))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn png_is_repeated_as_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(8, 4, image::Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!("image://{}?frames=2", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let frame = input.next_frame().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 4));
    assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
    assert_eq!(input.next_frame().unwrap().unwrap().index(), 1);
    assert!(input.next_frame().unwrap().is_none());
  }
}
