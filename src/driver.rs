// 该文件是 Shanan （山南西风） 项目的一部分。
// src/driver.rs - 云台驱动接口
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

use std::{collections::BTreeSet, time::Duration};

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, intent::MotionIntent};

mod log_driver;
pub use self::log_driver::{LogDriver, LogDriverError};

#[cfg(feature = "record_driver")]
mod record_driver;
#[cfg(feature = "record_driver")]
pub use self::record_driver::{RecordDriver, RecordDriverError};

/// 外部云台驱动
///
/// 所有调用都可能失败；`stop` 需要可以安全重试。
pub trait CameraDriver: Send + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn goto_preset(&mut self, token: &str, speed: f32) -> Result<(), Self::Error>;

  fn continuous_move(&mut self, pan: f32, tilt: f32, duration: Duration) -> Result<(), Self::Error>;

  fn set_zoom(&mut self, level: f32) -> Result<(), Self::Error>;

  fn stop(&mut self) -> Result<(), Self::Error>;

  fn execute(&mut self, intent: &MotionIntent) -> Result<(), Self::Error> {
    match intent {
      MotionIntent::GotoPreset { token, speed } => self.goto_preset(token, *speed),
      MotionIntent::ContinuousMove {
        pan,
        tilt,
        duration,
      } => self.continuous_move(*pan, *tilt, *duration),
      MotionIntent::Zoom { level } => self.set_zoom(*level),
      MotionIntent::Stop => self.stop(),
    }
  }
}

#[derive(Error, Debug)]
pub enum DriverError {
  #[error("日志驱动错误: {0}")]
  LogDriverError(#[from] LogDriverError),
  #[cfg(feature = "record_driver")]
  #[error("记录驱动错误: {0}")]
  RecordDriverError(#[from] RecordDriverError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 按 URL 方案选择的驱动
pub enum DriverWrapper {
  Log(LogDriver),
  #[cfg(feature = "record_driver")]
  Record(RecordDriver),
}

impl FromUrl for DriverWrapper {
  type Error = DriverError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogDriver::SCHEME => Ok(DriverWrapper::Log(LogDriver::from_url(url)?)),
      #[cfg(feature = "record_driver")]
      RecordDriver::SCHEME => Ok(DriverWrapper::Record(RecordDriver::from_url(url)?)),
      _ => Err(DriverError::SchemeMismatch),
    }
  }
}

impl CameraDriver for DriverWrapper {
  type Error = DriverError;

  fn goto_preset(&mut self, token: &str, speed: f32) -> Result<(), Self::Error> {
    match self {
      DriverWrapper::Log(driver) => driver.goto_preset(token, speed).map_err(DriverError::from),
      #[cfg(feature = "record_driver")]
      DriverWrapper::Record(driver) => driver.goto_preset(token, speed).map_err(DriverError::from),
    }
  }

  fn continuous_move(&mut self, pan: f32, tilt: f32, duration: Duration) -> Result<(), Self::Error> {
    match self {
      DriverWrapper::Log(driver) => driver
        .continuous_move(pan, tilt, duration)
        .map_err(DriverError::from),
      #[cfg(feature = "record_driver")]
      DriverWrapper::Record(driver) => driver
        .continuous_move(pan, tilt, duration)
        .map_err(DriverError::from),
    }
  }

  fn set_zoom(&mut self, level: f32) -> Result<(), Self::Error> {
    match self {
      DriverWrapper::Log(driver) => driver.set_zoom(level).map_err(DriverError::from),
      #[cfg(feature = "record_driver")]
      DriverWrapper::Record(driver) => driver.set_zoom(level).map_err(DriverError::from),
    }
  }

  fn stop(&mut self) -> Result<(), Self::Error> {
    match self {
      DriverWrapper::Log(driver) => driver.stop().map_err(DriverError::from),
      #[cfg(feature = "record_driver")]
      DriverWrapper::Record(driver) => driver.stop().map_err(DriverError::from),
    }
  }
}

/// 解析 `presets=P1,P2` 查询参数；未给出时不限制预置位
fn known_presets(url: &Url) -> Option<BTreeSet<String>> {
  url
    .query_pairs()
    .find(|(k, _)| k == "presets")
    .map(|(_, v)| {
      v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
    })
}

/// 解析 `latency_ms=N` 查询参数，模拟驱动调用耗时
fn latency(url: &Url) -> Result<Duration, String> {
  match url.query_pairs().find(|(k, _)| k == "latency_ms") {
    Some((_, v)) => v
      .parse::<u64>()
      .map(Duration::from_millis)
      .map_err(|_| v.to_string()),
    None => Ok(Duration::ZERO),
  }
}
