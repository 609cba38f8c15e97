// 该文件是 Shanan （山南西风） 项目的一部分。
// src/classifier/identity.rs - 目标身份关联
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
  collections::{HashMap, HashSet},
  fmt,
};

use serde::{Deserialize, Serialize};

use crate::{config::MotionConfig, detection::Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub u64);

impl fmt::Display for SubjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "subject-{}", self.0)
  }
}

#[derive(Debug, Clone, Copy)]
struct Centroid {
  position: Point,
  last_seen: u64,
}

/// 基于质心距离的贪心关联
///
/// 每个检测点匹配距离最近、且在 `association_distance` 以内的未使用质心；
/// 匹配不到就分配新的 id。超过 `subject_max_idle_ticks` 未出现的质心会被遗忘，
/// id 单调递增且不复用。
#[derive(Debug)]
pub struct SubjectAssociator {
  max_distance: f32,
  max_idle_ticks: u64,
  next_id: u64,
  centroids: HashMap<SubjectId, Centroid>,
}

impl SubjectAssociator {
  pub fn new(config: &MotionConfig) -> Self {
    Self {
      max_distance: config.association_distance,
      max_idle_ticks: config.subject_max_idle_ticks,
      next_id: 0,
      centroids: HashMap::new(),
    }
  }

  pub fn assign(&mut self, points: &[Point], tick: u64) -> Vec<SubjectId> {
    self.forget_idle(tick);

    let mut used: HashSet<SubjectId> = HashSet::with_capacity(points.len());
    let mut assigned = Vec::with_capacity(points.len());

    for point in points {
      let best = self
        .centroids
        .iter()
        .filter(|(id, _)| !used.contains(*id))
        .map(|(id, centroid)| (*id, centroid.position.distance(point)))
        .filter(|(_, distance)| *distance < self.max_distance)
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(id, _)| id);

      let id = match best {
        Some(id) => id,
        None => {
          let id = SubjectId(self.next_id);
          self.next_id += 1;
          id
        }
      };

      self.centroids.insert(
        id,
        Centroid {
          position: *point,
          last_seen: tick,
        },
      );
      used.insert(id);
      assigned.push(id);
    }

    assigned
  }

  fn forget_idle(&mut self, tick: u64) {
    let max_idle = self.max_idle_ticks;
    self
      .centroids
      .retain(|_, c| tick.saturating_sub(c.last_seen) <= max_idle);
  }

  pub fn len(&self) -> usize {
    self.centroids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.centroids.is_empty()
  }

  pub fn clear(&mut self) {
    self.centroids.clear();
  }
}
