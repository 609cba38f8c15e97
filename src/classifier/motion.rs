// 该文件是 Shanan （山南西风） 项目的一部分。
// src/classifier/motion.rs - 运动方向推断
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

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SubjectId;
use crate::{config::MotionConfig, detection::Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  LeftToRight,
  RightToLeft,
  TopToBottom,
  BottomToTop,
  Stationary,
}

#[derive(Debug)]
struct SubjectTrack {
  /// 最新的点在最前
  points: VecDeque<Point>,
  last_seen: u64,
}

/// 按目标保存的有界位置历史
#[derive(Debug)]
pub struct MotionHistory {
  history_length: usize,
  min_samples: usize,
  movement_threshold: f32,
  max_idle_ticks: u64,
  tracks: HashMap<SubjectId, SubjectTrack>,
}

impl MotionHistory {
  pub fn new(config: &MotionConfig) -> Self {
    Self {
      history_length: config.history_length.max(1),
      min_samples: config.min_samples,
      movement_threshold: config.movement_threshold,
      max_idle_ticks: config.subject_max_idle_ticks,
      tracks: HashMap::new(),
    }
  }

  /// 记录一个位置并给出该目标的运动方向
  ///
  /// 样本数不足 `min_samples` 时总是 `Stationary`；否则取窗口首尾的净位移，
  /// 两个轴都低于阈值为 `Stationary`，否则按位移较大的轴判定方向，相等时取水平方向。
  pub fn direction_for(&mut self, subject: SubjectId, point: Point, tick: u64) -> Direction {
    let capacity = self.history_length;
    let track = self.tracks.entry(subject).or_insert_with(|| SubjectTrack {
      points: VecDeque::with_capacity(capacity),
      last_seen: tick,
    });
    track.points.push_front(point);
    track.points.truncate(capacity);
    track.last_seen = tick;

    if track.points.len() < self.min_samples {
      return Direction::Stationary;
    }

    let (Some(newest), Some(oldest)) = (track.points.front(), track.points.back()) else {
      return Direction::Stationary;
    };
    let dx = newest.x - oldest.x;
    let dy = newest.y - oldest.y;

    if dx.abs() < self.movement_threshold && dy.abs() < self.movement_threshold {
      Direction::Stationary
    } else if dx.abs() >= dy.abs() {
      if dx > 0.0 {
        Direction::LeftToRight
      } else {
        Direction::RightToLeft
      }
    } else if dy > 0.0 {
      Direction::TopToBottom
    } else {
      Direction::BottomToTop
    }
  }

  /// 删除超过 `max_idle_ticks` 未出现的目标
  pub fn evict_idle(&mut self, tick: u64) -> usize {
    let before = self.tracks.len();
    let max_idle = self.max_idle_ticks;
    self
      .tracks
      .retain(|_, track| tick.saturating_sub(track.last_seen) <= max_idle);
    let evicted = before - self.tracks.len();
    if evicted > 0 {
      debug!("清理 {} 条过期的运动历史", evicted);
    }
    evicted
  }

  pub fn samples(&self, subject: SubjectId) -> usize {
    self.tracks.get(&subject).map(|t| t.points.len()).unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.tracks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tracks.is_empty()
  }

  pub fn clear(&mut self) {
    self.tracks.clear();
  }
}
