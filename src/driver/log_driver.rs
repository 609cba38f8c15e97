// 该文件是 Shanan （山南西风） 项目的一部分。
// src/driver/log_driver.rs - 只写日志的云台驱动
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

use std::{collections::BTreeSet, thread, time::Duration};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use super::{CameraDriver, known_presets, latency};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum LogDriverError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("非法的 latency_ms: {0}")]
  InvalidLatency(String),
  #[error("未知的预置位: {0}")]
  UnknownPreset(String),
}

/// `log://camera?presets=P1,P2&latency_ms=N`
///
/// 不连接任何设备，只把每个命令写进日志；给出 `presets` 时拒绝未知预置位。
#[derive(Debug, Clone)]
pub struct LogDriver {
  presets: Option<BTreeSet<String>>,
  latency: Duration,
}

impl LogDriver {
  pub fn new(presets: Option<BTreeSet<String>>, latency: Duration) -> Self {
    Self { presets, latency }
  }

  fn simulate(&self) {
    if !self.latency.is_zero() {
      thread::sleep(self.latency);
    }
  }
}

impl FromUrlWithScheme for LogDriver {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogDriver {
  type Error = LogDriverError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LogDriverError::SchemeMismatch);
    }
    let latency = latency(url).map_err(LogDriverError::InvalidLatency)?;
    Ok(Self::new(known_presets(url), latency))
  }
}

impl CameraDriver for LogDriver {
  type Error = LogDriverError;

  fn goto_preset(&mut self, token: &str, speed: f32) -> Result<(), Self::Error> {
    self.simulate();
    if let Some(presets) = &self.presets {
      if !presets.contains(token) {
        return Err(LogDriverError::UnknownPreset(token.to_string()));
      }
    }
    info!("云台转到预置位 {} (速度 {:.2})", token, speed);
    Ok(())
  }

  fn continuous_move(&mut self, pan: f32, tilt: f32, duration: Duration) -> Result<(), Self::Error> {
    self.simulate();
    info!("云台连续运动 pan={:+.3} tilt={:+.3} 持续 {:.2?}", pan, tilt, duration);
    Ok(())
  }

  fn set_zoom(&mut self, level: f32) -> Result<(), Self::Error> {
    self.simulate();
    info!("云台变焦到 {:.2}", level);
    Ok(())
  }

  fn stop(&mut self) -> Result<(), Self::Error> {
    self.simulate();
    info!("云台停止");
    Ok(())
  }
}
