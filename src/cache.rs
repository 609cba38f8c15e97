// 该文件是 Shanan （山南西风） 项目的一部分。
// src/cache.rs - 最新检测结果缓存
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

//! # 检测结果缓存
//!
//! 单槽位的“最新值”缓存：检测线程写入，跟踪循环与外部叠加层读取。
//!
//! - `put` 整体替换缓存内容，读者不会看到部分更新的列表
//! - `put` 一个空列表会清空缓存，不保留之前的检测框
//! - 检测超时只会把缓存标记为不新鲜 (`mark_stale`)，不会清空
//! - 空缓存的年龄始终为 0

use std::{
  sync::{Arc, PoisonError, RwLock},
  time::{Duration, Instant},
};

use tracing::debug;

use crate::detection::Detection;

#[derive(Debug)]
struct CacheEntry {
  detections: Arc<[Detection]>,
  updated_at: Option<Instant>,
  fresh: bool,
  generation: u64,
}

impl Default for CacheEntry {
  fn default() -> Self {
    Self {
      detections: Arc::from(Vec::new()),
      updated_at: None,
      fresh: true,
      generation: 0,
    }
  }
}

/// 某一时刻的缓存快照
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
  pub detections: Arc<[Detection]>,
  pub age: Duration,
  pub fresh: bool,
  pub generation: u64,
  pub max_age: Duration,
}

impl CacheSnapshot {
  /// 空快照，表示没有任何可用检测
  pub fn empty() -> Self {
    Self {
      detections: Arc::from(Vec::new()),
      age: Duration::ZERO,
      fresh: true,
      generation: 0,
      max_age: Duration::MAX,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  /// 非空、新鲜且未超过最大年龄
  pub fn is_usable(&self) -> bool {
    !self.detections.is_empty() && self.fresh && self.age <= self.max_age
  }
}

#[derive(Debug)]
pub struct DetectionCache {
  entry: RwLock<CacheEntry>,
  max_age: Duration,
}

impl DetectionCache {
  pub fn new(max_age: Duration) -> Self {
    Self {
      entry: RwLock::new(CacheEntry::default()),
      max_age,
    }
  }

  pub fn max_age(&self) -> Duration {
    self.max_age
  }

  pub fn put(&self, detections: Vec<Detection>) {
    self.put_at(detections, Instant::now());
  }

  pub fn put_at(&self, detections: Vec<Detection>, now: Instant) {
    let detections: Arc<[Detection]> = Arc::from(detections);
    let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
    entry.detections = detections;
    entry.updated_at = Some(now);
    entry.fresh = true;
    entry.generation += 1;
    debug!(
      "检测缓存更新: {} 个目标, 第 {} 代",
      entry.detections.len(),
      entry.generation
    );
  }

  pub fn get(&self) -> (Arc<[Detection]>, Duration) {
    self.get_at(Instant::now())
  }

  pub fn get_at(&self, now: Instant) -> (Arc<[Detection]>, Duration) {
    let snapshot = self.snapshot_at(now);
    (snapshot.detections, snapshot.age)
  }

  pub fn snapshot(&self) -> CacheSnapshot {
    self.snapshot_at(Instant::now())
  }

  pub fn snapshot_at(&self, now: Instant) -> CacheSnapshot {
    let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner);
    let age = if entry.detections.is_empty() {
      Duration::ZERO
    } else {
      entry
        .updated_at
        .map(|at| now.saturating_duration_since(at))
        .unwrap_or(Duration::ZERO)
    };

    CacheSnapshot {
      detections: entry.detections.clone(),
      age,
      fresh: entry.fresh,
      generation: entry.generation,
      max_age: self.max_age,
    }
  }

  /// 检测超时：保留检测框但标记为不新鲜
  pub fn mark_stale(&self) {
    let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
    entry.fresh = false;
  }

  pub fn clear(&self) {
    let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
    entry.detections = Arc::from(Vec::new());
    entry.updated_at = None;
    entry.fresh = true;
    entry.generation += 1;
  }
}
