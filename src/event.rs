// 该文件是 Shanan （山南西风） 项目的一部分。
// src/event.rs - 跟踪事件记录
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
  collections::VecDeque,
  sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::{Direction, RegionId, SubjectId};

/// 一次区域切换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
  pub timestamp: DateTime<Utc>,
  pub subject: Option<SubjectId>,
  pub class_name: String,
  pub confidence: f32,
  pub direction: Direction,
  pub from: Option<RegionId>,
  pub to: RegionId,
}

/// 有界、只追加、可取走的事件日志
///
/// 满了之后丢弃最旧的事件，并记录丢弃数量。
#[derive(Debug)]
pub struct EventLog {
  capacity: usize,
  inner: Mutex<EventLogInner>,
}

#[derive(Debug, Default)]
struct EventLogInner {
  events: VecDeque<TrackingEvent>,
  dropped: u64,
  total: u64,
}

impl EventLog {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      inner: Mutex::new(EventLogInner::default()),
    }
  }

  pub fn push(&self, event: TrackingEvent) {
    let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.events.len() >= self.capacity {
      inner.events.pop_front();
      inner.dropped += 1;
      if inner.dropped.is_power_of_two() {
        warn!("事件日志已满，累计丢弃 {} 条", inner.dropped);
      }
    }
    inner.events.push_back(event);
    inner.total += 1;
  }

  /// 取走当前所有事件
  pub fn drain(&self) -> Vec<TrackingEvent> {
    let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.events.drain(..).collect()
  }

  pub fn len(&self) -> usize {
    let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn dropped(&self) -> u64 {
    let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.dropped
  }

  pub fn total(&self) -> u64 {
    let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.total
  }
}
