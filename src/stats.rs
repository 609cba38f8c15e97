// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stats.rs - 运行统计
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

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::intent::IntentKind;

/// 各线程共享的计数器
#[derive(Debug, Default)]
pub struct Statistics {
  pub(crate) frames_received: AtomicU64,
  pub(crate) frames_dropped: AtomicU64,
  pub(crate) frames_processed: AtomicU64,
  pub(crate) detector_submitted: AtomicU64,
  pub(crate) detector_skipped: AtomicU64,
  pub(crate) detector_completed: AtomicU64,
  pub(crate) detector_timeouts: AtomicU64,
  pub(crate) detector_errors: AtomicU64,
  pub(crate) detector_discarded: AtomicU64,
  pub(crate) ticks: AtomicU64,
  pub(crate) goto_preset: AtomicU64,
  pub(crate) continuous_move: AtomicU64,
  pub(crate) zoom: AtomicU64,
  pub(crate) stop: AtomicU64,
  pub(crate) intents_dropped: AtomicU64,
  pub(crate) command_failures: AtomicU64,
  pub(crate) events: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
  pub frames_received: u64,
  pub frames_dropped: u64,
  pub frames_processed: u64,
  pub detector_submitted: u64,
  pub detector_skipped: u64,
  pub detector_completed: u64,
  pub detector_timeouts: u64,
  pub detector_errors: u64,
  pub detector_discarded: u64,
  pub ticks: u64,
  pub goto_preset: u64,
  pub continuous_move: u64,
  pub zoom: u64,
  pub stop: u64,
  pub intents_dropped: u64,
  pub command_failures: u64,
  pub events: u64,
}

impl Statistics {
  pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_intent(&self, kind: IntentKind) {
    let counter = match kind {
      IntentKind::GotoPreset => &self.goto_preset,
      IntentKind::ContinuousMove => &self.continuous_move,
      IntentKind::Zoom => &self.zoom,
      IntentKind::Stop => &self.stop,
    };
    Self::bump(counter);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
    StatsSnapshot {
      frames_received: load(&self.frames_received),
      frames_dropped: load(&self.frames_dropped),
      frames_processed: load(&self.frames_processed),
      detector_submitted: load(&self.detector_submitted),
      detector_skipped: load(&self.detector_skipped),
      detector_completed: load(&self.detector_completed),
      detector_timeouts: load(&self.detector_timeouts),
      detector_errors: load(&self.detector_errors),
      detector_discarded: load(&self.detector_discarded),
      ticks: load(&self.ticks),
      goto_preset: load(&self.goto_preset),
      continuous_move: load(&self.continuous_move),
      zoom: load(&self.zoom),
      stop: load(&self.stop),
      intents_dropped: load(&self.intents_dropped),
      command_failures: load(&self.command_failures),
      events: load(&self.events),
    }
  }
}

impl StatsSnapshot {
  pub fn intents(&self) -> u64 {
    self.goto_preset + self.continuous_move + self.zoom + self.stop
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intents_are_counted_per_kind() {
    let stats = Statistics::default();
    stats.record_intent(IntentKind::GotoPreset);
    stats.record_intent(IntentKind::Stop);
    stats.record_intent(IntentKind::Stop);
    Statistics::bump(&stats.ticks);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.goto_preset, 1);
    assert_eq!(snapshot.stop, 2);
    assert_eq!(snapshot.intents(), 3);
    assert_eq!(snapshot.ticks, 1);
  }

  #[test]
  fn snapshot_serializes_flat() {
    let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
    assert_eq!(json["frames_dropped"], 0);
    assert_eq!(json["command_failures"], 0);
  }
}
