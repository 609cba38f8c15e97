// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detector.rs - 目标检测器接口
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detection::Detection, frame::Frame};

mod replay;
pub use self::replay::{ReplayBox, ReplayDetector, ReplayDetectorError, ReplayRecord};

/// 外部目标检测器
///
/// 调用可能很慢，由编排器放在单独的线程里执行；返回空列表表示确认没有目标。
pub trait Detector: Send + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("回放检测器错误: {0}")]
  ReplayDetectorError(#[from] ReplayDetectorError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum DetectorWrapper {
  Replay(ReplayDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayDetector::SCHEME => Ok(DetectorWrapper::Replay(ReplayDetector::from_url(url)?)),
      _ => Err(DetectorError::SchemeMismatch),
    }
  }
}

impl Detector for DetectorWrapper {
  type Error = DetectorError;

  fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
    match self {
      DetectorWrapper::Replay(detector) => detector.detect(frame).map_err(DetectorError::from),
    }
  }
}
