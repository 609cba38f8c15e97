// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use crate::detection::Point;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧尺寸无效: {width}x{height}")]
  ZeroDimension { width: u32, height: u32 },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 帧尺寸，宽高均大于零
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
  width: u32,
  height: u32,
}

impl FrameSize {
  pub fn new(width: u32, height: u32) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::ZeroDimension { width, height });
    }
    Ok(Self { width, height })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn center(&self) -> Point {
    Point::new(self.width as f32 / 2.0, self.height as f32 / 2.0)
  }

  pub fn rgb_len(&self) -> usize {
    RGB_CHANNELS * self.width as usize * self.height as usize
  }
}

/// RGB (NHWC) 视频帧
///
/// 像素数据使用 `Arc` 共享，克隆一帧交给检测线程的开销与帧大小无关。
#[derive(Debug, Clone)]
pub struct Frame {
  pixels: Arc<[u8]>,
  size: FrameSize,
  index: u64,
  timestamp: Instant,
}

impl Frame {
  pub fn new(
    pixels: impl Into<Arc<[u8]>>,
    size: FrameSize,
    index: u64,
    timestamp: Instant,
  ) -> Result<Self, FrameError> {
    let pixels = pixels.into();
    if pixels.len() != size.rgb_len() {
      return Err(FrameError::LengthMismatch {
        expected: size.rgb_len(),
        actual: pixels.len(),
      });
    }

    Ok(Self {
      pixels,
      size,
      index,
      timestamp,
    })
  }

  /// 不携带像素的帧，用于只关心几何信息的场景
  pub fn empty(size: FrameSize, index: u64, timestamp: Instant) -> Self {
    Self {
      pixels: Arc::from(Vec::new()),
      size,
      index,
      timestamp,
    }
  }

  pub fn pixels(&self) -> &[u8] {
    &self.pixels
  }

  pub fn size(&self) -> FrameSize {
    self.size
  }

  pub fn width(&self) -> u32 {
    self.size.width
  }

  pub fn height(&self) -> u32 {
    self.size.height
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn timestamp(&self) -> Instant {
    self.timestamp
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}
