// 该文件是 Shanan （山南西风） 项目的一部分。
// src/driver/record_driver.rs - 把云台命令记录到文件
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
  collections::BTreeSet,
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use super::{CameraDriver, known_presets};
use crate::{FromUrl, FromUrlWithScheme, intent::MotionIntent};

#[derive(Error, Debug)]
pub enum RecordDriverError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("未知的预置位: {0}")]
  UnknownPreset(String),
}

#[derive(Serialize)]
struct CommandRecord<'a> {
  timestamp: DateTime<Utc>,
  #[serde(flatten)]
  intent: &'a MotionIntent,
}

/// `record:///path/to/commands.jsonl?presets=P1,P2`
///
/// 每条命令追加一行 JSON，便于离线回放与核对。
pub struct RecordDriver {
  path: PathBuf,
  writer: BufWriter<File>,
  presets: Option<BTreeSet<String>>,
}

impl RecordDriver {
  pub fn create(path: impl AsRef<Path>, presets: Option<BTreeSet<String>>) -> Result<Self, RecordDriverError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() && !parent.exists() {
        std::fs::create_dir_all(parent)?;
      }
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    debug!("命令记录写入 {}", path.display());
    Ok(Self {
      path,
      writer: BufWriter::new(file),
      presets,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn record(&mut self, intent: &MotionIntent) -> Result<(), RecordDriverError> {
    let record = CommandRecord {
      timestamp: Utc::now(),
      intent,
    };
    serde_json::to_writer(&mut self.writer, &record)?;
    self.writer.write_all(b"\n")?;
    self.writer.flush()?;
    Ok(())
  }
}

impl FromUrlWithScheme for RecordDriver {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordDriver {
  type Error = RecordDriverError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RecordDriverError::SchemeMismatch);
    }
    Self::create(url.path(), known_presets(url))
  }
}

impl CameraDriver for RecordDriver {
  type Error = RecordDriverError;

  fn goto_preset(&mut self, token: &str, speed: f32) -> Result<(), Self::Error> {
    if let Some(presets) = &self.presets {
      if !presets.contains(token) {
        return Err(RecordDriverError::UnknownPreset(token.to_string()));
      }
    }
    self.record(&MotionIntent::goto_preset(token, speed))
  }

  fn continuous_move(&mut self, pan: f32, tilt: f32, duration: Duration) -> Result<(), Self::Error> {
    self.record(&MotionIntent::ContinuousMove {
      pan,
      tilt,
      duration,
    })
  }

  fn set_zoom(&mut self, level: f32) -> Result<(), Self::Error> {
    self.record(&MotionIntent::Zoom { level })
  }

  fn stop(&mut self) -> Result<(), Self::Error> {
    self.record(&MotionIntent::Stop)
  }
}
