// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detector/replay.rs - 回放预先录制的检测结果
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
  collections::BTreeMap,
  fs::File,
  io::{BufRead, BufReader},
  path::Path,
  thread,
  time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use super::Detector;
use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{BoundingBox, Detection},
  frame::Frame,
};

#[derive(Error, Debug)]
pub enum ReplayDetectorError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
  #[error("非法的 latency_ms: {0}")]
  InvalidLatency(String),
}

/// 回放文件中的一个检测框
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBox {
  pub class_name: String,
  pub confidence: f32,
  /// [x1, y1, x2, y2]
  pub bbox: [f32; 4],
}

/// 回放文件的一行：从 `frame` 开始生效的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
  pub frame: u64,
  #[serde(default)]
  pub detections: Vec<ReplayBox>,
}

/// `replay:///path/to/detections.jsonl?latency_ms=N`
///
/// 每一帧返回帧号不大于当前帧的最近一条记录；第一条记录之前返回空列表。
#[derive(Debug, Clone)]
pub struct ReplayDetector {
  records: BTreeMap<u64, Vec<ReplayBox>>,
  latency: Duration,
}

impl ReplayDetector {
  pub fn new(records: impl IntoIterator<Item = ReplayRecord>, latency: Duration) -> Self {
    let records = records
      .into_iter()
      .map(|record| (record.frame, record.detections))
      .collect();
    Self { records, latency }
  }

  pub fn from_jsonl(path: impl AsRef<Path>, latency: Duration) -> Result<Self, ReplayDetectorError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
      let line = line?;
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let record: ReplayRecord = serde_json::from_str(line).map_err(|source| ReplayDetectorError::ParseError {
        line: index + 1,
        source,
      })?;
      records.push(record);
    }
    info!(
      "加载回放检测 {} 条，来自 {}",
      records.len(),
      path.as_ref().display()
    );
    Ok(Self::new(records, latency))
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayDetectorError::SchemeMismatch);
    }

    let latency = match url.query_pairs().find(|(k, _)| k == "latency_ms") {
      Some((_, v)) => v
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ReplayDetectorError::InvalidLatency(v.to_string()))?,
      None => Duration::ZERO,
    };

    Self::from_jsonl(url.path(), latency)
  }
}

impl Detector for ReplayDetector {
  type Error = ReplayDetectorError;

  fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
    if !self.latency.is_zero() {
      thread::sleep(self.latency);
    }

    let boxes = self
      .records
      .range(..=frame.index())
      .next_back()
      .map(|(_, boxes)| boxes.as_slice())
      .unwrap_or_default();

    Ok(
      boxes
        .iter()
        .map(|b| {
          let [x1, y1, x2, y2] = b.bbox;
          Detection::new(
            b.class_name.clone(),
            b.confidence,
            BoundingBox::new(x1, y1, x2, y2),
            frame.timestamp(),
          )
        })
        .collect(),
    )
  }
}
