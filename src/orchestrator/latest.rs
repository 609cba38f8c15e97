// 该文件是 Shanan （山南西风） 项目的一部分。
// src/orchestrator/latest.rs - 只保留最新一帧的槽位
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
  sync::{Condvar, Mutex, PoisonError},
  time::{Duration, Instant},
};

use crate::frame::Frame;

#[derive(Debug)]
pub enum Take {
  Frame(Frame),
  Empty,
  Closed,
}

#[derive(Debug, Default)]
struct Slot {
  frame: Option<Frame>,
  closed: bool,
  dropped: u64,
}

/// 消费者跟不上时，未读的旧帧直接被新帧覆盖
#[derive(Debug, Default)]
pub struct LatestFrame {
  slot: Mutex<Slot>,
  ready: Condvar,
}

impl LatestFrame {
  pub fn new() -> Self {
    Self::default()
  }

  /// 放入一帧；覆盖了未读帧时返回 `true`
  pub fn put(&self, frame: Frame) -> bool {
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    let replaced = slot.frame.replace(frame).is_some();
    if replaced {
      slot.dropped += 1;
    }
    drop(slot);
    self.ready.notify_one();
    replaced
  }

  /// 最多等待 `timeout`；关闭后仍会先交出剩下的那一帧
  pub fn take_timeout(&self, timeout: Duration) -> Take {
    let deadline = Instant::now() + timeout;
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
      if let Some(frame) = slot.frame.take() {
        return Take::Frame(frame);
      }
      if slot.closed {
        return Take::Closed;
      }
      let now = Instant::now();
      if now >= deadline {
        return Take::Empty;
      }
      slot = self
        .ready
        .wait_timeout(slot, deadline - now)
        .unwrap_or_else(PoisonError::into_inner)
        .0;
    }
  }

  pub fn close(&self) {
    let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
    slot.closed = true;
    drop(slot);
    self.ready.notify_all();
  }

  pub fn is_closed(&self) -> bool {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner).closed
  }

  pub fn dropped(&self) -> u64 {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner).dropped
  }
}
