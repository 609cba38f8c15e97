// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tracking.rs - 跟踪状态机
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
  collections::HashMap,
  time::{Duration, Instant},
};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  cache::CacheSnapshot,
  classifier::{Direction, Layout, MotionHistory, RegionId, SpatialClassifier, SubjectAssociator, SubjectId},
  config::{FineTuneConfig, RegionTarget, TrackingConfig},
  detection::{Detection, Point},
  event::TrackingEvent,
  frame::FrameSize,
  intent::MotionIntent,
};

/// 跟踪模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "layout", rename_all = "snake_case")]
pub enum TrackingMode {
  Disabled,
  RegionTracking(Layout),
  /// 预置位调用失败后，只做连续微调，直到下一次区域切换
  FineTrackingOnly(Layout),
  ManualOverride(Layout),
}

impl TrackingMode {
  pub fn layout(&self) -> Option<Layout> {
    match self {
      TrackingMode::Disabled => None,
      TrackingMode::RegionTracking(layout)
      | TrackingMode::FineTrackingOnly(layout)
      | TrackingMode::ManualOverride(layout) => Some(*layout),
    }
  }

  /// 是否处于自动跟踪
  pub fn is_tracking(&self) -> bool {
    matches!(
      self,
      TrackingMode::RegionTracking(_) | TrackingMode::FineTrackingOnly(_)
    )
  }
}

/// 对外暴露的当前状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingStatus {
  pub mode: TrackingMode,
  pub current_region: Option<RegionId>,
  pub active: bool,
  pub moving: bool,
}

/// 一次 tick 的产出
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
  pub intents: Vec<MotionIntent>,
  pub event: Option<TrackingEvent>,
}

impl TickOutcome {
  pub fn is_empty(&self) -> bool {
    self.intents.is_empty() && self.event.is_none()
  }
}

/// 状态机独占的跟踪状态
#[derive(Debug)]
pub struct TrackingState {
  pub mode: TrackingMode,
  pub current_region: Option<RegionId>,
  pub last_preset_at: Option<Instant>,
  pub last_command_at: Option<Instant>,
  /// 每个区域本次进入后已执行的一次性动作计数
  entry_repeats: HashMap<RegionId, u32>,
  moving: bool,
  at_home: bool,
  last_seen_at: Option<Instant>,
  last_generation: Option<u64>,
  last_subject: Option<SubjectId>,
  last_direction: Direction,
  tick: u64,
  history: MotionHistory,
  subjects: SubjectAssociator,
}

impl TrackingState {
  fn new(config: &TrackingConfig) -> Self {
    Self {
      mode: TrackingMode::Disabled,
      current_region: None,
      last_preset_at: None,
      last_command_at: None,
      entry_repeats: HashMap::new(),
      moving: false,
      at_home: false,
      last_seen_at: None,
      last_generation: None,
      last_subject: None,
      last_direction: Direction::Stationary,
      tick: 0,
      history: MotionHistory::new(&config.motion),
      subjects: SubjectAssociator::new(&config.motion),
    }
  }

  fn forget_region(&mut self) {
    self.current_region = None;
    self.entry_repeats.clear();
  }

  fn reset(&mut self) {
    self.forget_region();
    self.last_preset_at = None;
    self.last_command_at = None;
    self.moving = false;
    self.at_home = false;
    self.last_seen_at = None;
    self.last_generation = None;
    self.last_subject = None;
    self.last_direction = Direction::Stationary;
    self.history.clear();
    self.subjects.clear();
  }

  pub fn is_moving(&self) -> bool {
    self.moving
  }

  pub fn entry_repeats(&self, region: &RegionId) -> u32 {
    self.entry_repeats.get(region).copied().unwrap_or(0)
  }

  pub fn tick_count(&self) -> u64 {
    self.tick
  }
}

/// 连续微调速度
///
/// 每个轴：`n = clamp(offset / (ratio * half), -1, 1)`，`v = n * |n|`，
/// 低于 `min_velocity` 的轴置零；两个轴都为零时返回 `None`。
/// 目标在画面下方时 tilt 为负（向下）。
pub fn fine_tune_velocity(center: Point, size: FrameSize, config: &FineTuneConfig) -> Option<(f32, f32)> {
  let mid = size.center();
  let axis = |offset: f32, half: f32| {
    let max_offset = (half * config.max_offset_ratio).max(f32::EPSILON);
    let n = (offset / max_offset).clamp(-1.0, 1.0);
    let v = n * n.abs();
    if v.abs() < config.min_velocity { 0.0 } else { v }
  };

  let pan = axis(center.x - mid.x, mid.x);
  let tilt = -axis(center.y - mid.y, mid.y);
  if pan == 0.0 && tilt == 0.0 {
    None
  } else {
    Some((pan, tilt))
  }
}

/// 跟踪状态机
///
/// 每帧调用一次 [`StateMachine::tick`]，输入当前的检测缓存快照，
/// 输出需要下发的运动意图和可能的区域切换事件。
#[derive(Debug)]
pub struct StateMachine {
  config: TrackingConfig,
  classifier: SpatialClassifier,
  state: TrackingState,
}

impl StateMachine {
  pub fn new(config: TrackingConfig) -> Self {
    let classifier = SpatialClassifier::new(config.zones.clone());
    let state = TrackingState::new(&config);
    Self {
      config,
      classifier,
      state,
    }
  }

  pub fn config(&self) -> &TrackingConfig {
    &self.config
  }

  pub fn state(&self) -> &TrackingState {
    &self.state
  }

  pub fn mode(&self) -> TrackingMode {
    self.state.mode
  }

  pub fn current_region(&self) -> Option<&RegionId> {
    self.state.current_region.as_ref()
  }

  pub fn status(&self) -> TrackingStatus {
    TrackingStatus {
      mode: self.state.mode,
      current_region: self.state.current_region.clone(),
      active: self.state.mode.is_tracking(),
      moving: self.state.moving,
    }
  }

  pub fn start(&mut self, layout: Layout, now: Instant) {
    match self.state.mode {
      TrackingMode::RegionTracking(current) | TrackingMode::FineTrackingOnly(current) => {
        if current != layout {
          self.set_layout(layout);
        } else {
          debug!("跟踪已在运行: {}", layout);
        }
      }
      TrackingMode::Disabled | TrackingMode::ManualOverride(_) => {
        self.state.reset();
        self.state.mode = TrackingMode::RegionTracking(layout);
        self.state.last_seen_at = Some(now);
        info!("开始跟踪，区域划分: {}", layout);
      }
    }
  }

  /// 停止跟踪并清空全部跟踪状态；如果云台正在运动，返回一个 `Stop`
  pub fn stop(&mut self) -> Option<MotionIntent> {
    let stop = self.state.moving.then_some(MotionIntent::Stop);
    if self.state.mode != TrackingMode::Disabled {
      info!("停止跟踪");
    }
    self.state.reset();
    self.state.mode = TrackingMode::Disabled;
    stop
  }

  /// 切换区域划分方式，当前区域与计数器随之清空
  pub fn set_layout(&mut self, layout: Layout) {
    let next = match self.state.mode {
      TrackingMode::Disabled => {
        debug!("跟踪未启动，忽略区域划分切换");
        return;
      }
      TrackingMode::RegionTracking(current) | TrackingMode::FineTrackingOnly(current) => {
        if current == layout {
          return;
        }
        TrackingMode::RegionTracking(layout)
      }
      TrackingMode::ManualOverride(current) => {
        if current == layout {
          return;
        }
        TrackingMode::ManualOverride(layout)
      }
    };
    info!("区域划分切换为 {}", layout);
    self.state.mode = next;
    self.state.forget_region();
  }

  /// 进入手动控制，自动跟踪暂停
  pub fn manual_override(&mut self) -> Option<MotionIntent> {
    match self.state.mode {
      TrackingMode::RegionTracking(layout) | TrackingMode::FineTrackingOnly(layout) => {
        info!("进入手动控制");
        self.state.mode = TrackingMode::ManualOverride(layout);
        let stop = self.state.moving.then_some(MotionIntent::Stop);
        self.state.moving = false;
        stop
      }
      TrackingMode::Disabled | TrackingMode::ManualOverride(_) => None,
    }
  }

  /// 从手动控制恢复自动跟踪；手动运动仍在进行时返回一个 `Stop`
  pub fn resume(&mut self, now: Instant) -> Option<MotionIntent> {
    let TrackingMode::ManualOverride(layout) = self.state.mode else {
      return None;
    };
    info!("恢复自动跟踪");
    self.state.mode = TrackingMode::RegionTracking(layout);
    self.state.forget_region();
    self.state.last_seen_at = Some(now);
    let stop = self.state.moving.then_some(MotionIntent::Stop);
    self.state.moving = false;
    stop
  }

  /// 记录手动控制下发的意图，之后的 `stop`/`resume` 据此决定是否需要停下云台
  pub fn note_manual(&mut self, intent: &MotionIntent, now: Instant) {
    match intent {
      MotionIntent::ContinuousMove { .. } => self.state.moving = true,
      MotionIntent::Stop => self.state.moving = false,
      MotionIntent::GotoPreset { .. } => {
        self.state.moving = false;
        self.state.last_preset_at = Some(now);
      }
      MotionIntent::Zoom { .. } => {}
    }
    self.state.last_command_at = Some(now);
  }

  /// 命令下发失败的回调
  pub fn on_command_failed(&mut self, intent: &MotionIntent) {
    match intent {
      MotionIntent::GotoPreset { token, .. } => {
        if let TrackingMode::RegionTracking(layout) = self.state.mode {
          warn!("预置位 {} 调用失败，退化为仅微调", token);
          self.state.mode = TrackingMode::FineTrackingOnly(layout);
        }
      }
      MotionIntent::Stop => {
        self.state.moving = false;
      }
      MotionIntent::ContinuousMove { .. } | MotionIntent::Zoom { .. } => {
        debug!("命令 {} 失败，本次忽略", intent);
      }
    }
  }

  pub fn tick(&mut self, snapshot: &CacheSnapshot, size: FrameSize, now: Instant) -> TickOutcome {
    self.state.tick += 1;
    let layout = match self.state.mode {
      TrackingMode::RegionTracking(layout) | TrackingMode::FineTrackingOnly(layout) => layout,
      TrackingMode::Disabled | TrackingMode::ManualOverride(_) => return TickOutcome::default(),
    };

    let primary = if snapshot.is_usable() {
      self.observe(snapshot, size)
    } else {
      None
    };
    let Some(primary) = primary else {
      return self.on_absent(now);
    };

    self.state.last_seen_at = Some(now);
    self.state.at_home = false;

    let center = primary.center();
    let mut outcome = TickOutcome::default();
    let region = self.classifier.classify(layout, center, size);

    if let Some(region) = region {
      match self.state.current_region.clone() {
        None => {
          info!("首次捕获目标，位于 {}", region);
          outcome.event = Some(self.event(&primary, None, region.clone()));
          self.state.current_region = Some(region.clone());
          self.state.entry_repeats.insert(region, 0);
        }
        Some(current) if current != region => {
          if self.cooldown_active(now) {
            debug!("冷却中，推迟切换 {} -> {}", current, region);
          } else {
            let committed = self.transition(&primary, region, now, &mut outcome);
            if committed {
              return outcome;
            }
          }
        }
        Some(_) => {}
      }
    }

    if let Some(intent) = self.fine_tune(center, size, now) {
      outcome.intents.push(intent);
    }
    outcome
  }

  /// 提交区域切换。发出了 `GotoPreset` 时返回 `true`，本次 tick 不再微调。
  fn transition(&mut self, primary: &Detection, region: RegionId, now: Instant, outcome: &mut TickOutcome) -> bool {
    let from = self.state.current_region.replace(region.clone());
    info!(
      "区域切换: {} -> {}",
      from.as_ref().map(ToString::to_string).unwrap_or_default(),
      region
    );
    outcome.event = Some(self.event(primary, from, region.clone()));

    if let TrackingMode::FineTrackingOnly(layout) = self.state.mode {
      self.state.mode = TrackingMode::RegionTracking(layout);
    }
    self.state.entry_repeats.insert(region.clone(), 0);

    let target = self.region_target(&region).cloned().unwrap_or_default();
    let mut sent_preset = false;
    match target.preset {
      Some(token) => {
        // 预置位运动会覆盖正在进行的连续运动
        self.state.moving = false;
        outcome
          .intents
          .push(MotionIntent::goto_preset(token, self.config.preset.speed));
        self.state.last_preset_at = Some(now);
        self.state.last_command_at = Some(now);
        sent_preset = true;
      }
      None => {
        warn!("区域 {} 没有对应的预置位", region);
      }
    }

    if let Some(level) = target.zoom_on_entry {
      let repeats = self.state.entry_repeats.entry(region).or_insert(0);
      if *repeats == 0 {
        outcome.intents.push(MotionIntent::Zoom { level });
        *repeats += 1;
      }
    }
    sent_preset
  }

  fn on_absent(&mut self, now: Instant) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    if self.state.moving {
      debug!("没有可用的检测，停止云台");
      outcome.intents.push(MotionIntent::Stop);
      self.state.moving = false;
      self.state.last_command_at = Some(now);
    }

    let Some(home) = &self.config.home else {
      return outcome;
    };
    if self.state.at_home || self.cooldown_active(now) {
      return outcome;
    }
    let idle = self
      .state
      .last_seen_at
      .map(|at| now.saturating_duration_since(at))
      .unwrap_or(Duration::ZERO);
    if idle >= home.inactivity() {
      info!("{:.1?} 未见目标，回到预置位 {}", idle, home.preset);
      outcome
        .intents
        .push(MotionIntent::goto_preset(home.preset.clone(), self.config.preset.speed));
      self.state.at_home = true;
      self.state.last_preset_at = Some(now);
      self.state.last_command_at = Some(now);
      self.state.forget_region();
    }
    outcome
  }

  fn fine_tune(&mut self, center: Point, size: FrameSize, now: Instant) -> Option<MotionIntent> {
    match fine_tune_velocity(center, size, &self.config.fine_tune) {
      Some((pan, tilt)) => {
        self.state.moving = true;
        self.state.last_command_at = Some(now);
        Some(MotionIntent::ContinuousMove {
          pan,
          tilt,
          duration: self.config.fine_tune.move_duration(),
        })
      }
      None if self.state.moving => {
        self.state.moving = false;
        self.state.last_command_at = Some(now);
        Some(MotionIntent::Stop)
      }
      None => None,
    }
  }

  /// 过滤检测并选出主目标；缓存代数变化时更新身份与运动历史
  fn observe(&mut self, snapshot: &CacheSnapshot, size: FrameSize) -> Option<Detection> {
    let detection = &self.config.detection;
    let candidates: Vec<Detection> = snapshot
      .detections
      .iter()
      .filter(|d| detection.accepts_class(&d.class_name))
      .filter(|d| d.confidence >= detection.min_confidence)
      .filter_map(|d| d.clamped(size))
      .collect();

    let primary_index = candidates
      .iter()
      .enumerate()
      .max_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence))
      .map(|(index, _)| index);

    if self.state.last_generation != Some(snapshot.generation) {
      self.state.last_generation = Some(snapshot.generation);
      let tick = self.state.tick;
      let centers: Vec<Point> = candidates.iter().map(Detection::center).collect();
      let ids = self.state.subjects.assign(&centers, tick);
      self.state.history.evict_idle(tick);
      if let Some(index) = primary_index {
        let subject = ids[index];
        self.state.last_subject = Some(subject);
        self.state.last_direction = self.state.history.direction_for(subject, centers[index], tick);
      }
    }

    primary_index.map(|index| candidates[index].clone())
  }

  fn event(&self, primary: &Detection, from: Option<RegionId>, to: RegionId) -> TrackingEvent {
    TrackingEvent {
      timestamp: Utc::now(),
      subject: self.state.last_subject,
      class_name: primary.class_name.clone(),
      confidence: primary.confidence,
      direction: self.state.last_direction,
      from,
      to,
    }
  }

  fn region_target(&self, region: &RegionId) -> Option<&RegionTarget> {
    match region {
      RegionId::Zone(id) => self.config.zone(id).map(|zone| &zone.target),
      RegionId::Quadrant(quadrant) => self.config.quadrant_target(*quadrant),
    }
  }

  fn cooldown_active(&self, now: Instant) -> bool {
    self
      .state
      .last_preset_at
      .map(|at| now.saturating_duration_since(at) < self.config.preset.cooldown())
      .unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    cache::DetectionCache,
    classifier::Quadrant,
    config::{HomeConfig, ZoneConfig},
    detection::BoundingBox,
  };

  fn size() -> FrameSize {
    FrameSize::new(800, 600).unwrap()
  }

  fn person_at(x: f32, y: f32, at: Instant) -> Detection {
    Detection::new(
      "person",
      0.9,
      BoundingBox::new(x - 20.0, y - 20.0, x + 20.0, y + 20.0),
      at,
    )
  }

  fn quadrant_config() -> TrackingConfig {
    let mut config = TrackingConfig::default();
    config
      .quadrants
      .insert(Quadrant::TopLeft, RegionTarget::with_preset("P1"));
    config
      .quadrants
      .insert(Quadrant::TopRight, RegionTarget::with_preset("P2"));
    config
  }

  fn presets(intents: &[MotionIntent]) -> Vec<&str> {
    intents
      .iter()
      .filter_map(|i| match i {
        MotionIntent::GotoPreset { token, .. } => Some(token.as_str()),
        _ => None,
      })
      .collect()
  }

  struct Rig {
    machine: StateMachine,
    cache: DetectionCache,
    start: Instant,
  }

  impl Rig {
    fn new(config: TrackingConfig, layout: Layout) -> Self {
      let start = Instant::now();
      let cache = DetectionCache::new(config.detection.max_age());
      let mut machine = StateMachine::new(config);
      machine.start(layout, start);
      Self {
        machine,
        cache,
        start,
      }
    }

    fn at(&self, millis: u64) -> Instant {
      self.start + Duration::from_millis(millis)
    }

    fn see(&mut self, x: f32, y: f32, millis: u64) -> TickOutcome {
      let now = self.at(millis);
      self.cache.put_at(vec![person_at(x, y, now)], now);
      self.tick(millis)
    }

    fn tick(&mut self, millis: u64) -> TickOutcome {
      let now = self.at(millis);
      let snapshot = self.cache.snapshot_at(now);
      self.machine.tick(&snapshot, size(), now)
    }
  }

  #[test]
  fn fine_tune_is_quadratic_and_signed() {
    let config = FineTuneConfig::default();
    let (pan, tilt) = fine_tune_velocity(Point::new(600.0, 300.0), size(), &config).unwrap();
    assert!((pan - 0.25).abs() < 1e-6);
    assert_eq!(tilt, 0.0);

    let (pan, tilt) = fine_tune_velocity(Point::new(0.0, 600.0), size(), &config).unwrap();
    assert!((pan + 1.0).abs() < 1e-6);
    assert!((tilt + 1.0).abs() < 1e-6);
  }

  #[test]
  fn fine_tune_suppresses_jitter() {
    let config = FineTuneConfig::default();
    assert_eq!(fine_tune_velocity(Point::new(400.0, 300.0), size(), &config), None);
    // 偏移 5%，平方后 0.0025，低于 0.01
    assert_eq!(fine_tune_velocity(Point::new(420.0, 315.0), size(), &config), None);
  }

  #[test]
  fn first_acquisition_adopts_region_without_preset() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    let outcome = rig.see(50.0, 50.0, 0);
    assert!(presets(&outcome.intents).is_empty());
    let event = outcome.event.unwrap();
    assert_eq!(event.from, None);
    assert_eq!(event.to, RegionId::Quadrant(Quadrant::TopLeft));
    assert_eq!(
      rig.machine.current_region(),
      Some(&RegionId::Quadrant(Quadrant::TopLeft))
    );
  }

  #[test]
  fn region_change_during_cooldown_is_deferred() {
    let mut config = quadrant_config();
    config.preset.cooldown_secs = 0.5;
    config
      .quadrants
      .insert(Quadrant::BottomLeft, RegionTarget::with_preset("P3"));
    let mut rig = Rig::new(config, Layout::Quadrants);

    rig.see(50.0, 50.0, 0);
    let outcome = rig.see(700.0, 50.0, 100);
    assert_eq!(presets(&outcome.intents), vec!["P2"]);

    // 冷却期内再次换区：不切换，继续微调
    let outcome = rig.see(50.0, 500.0, 200);
    assert!(presets(&outcome.intents).is_empty());
    assert!(outcome.event.is_none());
    assert_eq!(
      rig.machine.current_region(),
      Some(&RegionId::Quadrant(Quadrant::TopRight))
    );
    assert!(
      outcome
        .intents
        .iter()
        .any(|i| matches!(i, MotionIntent::ContinuousMove { .. }))
    );

    // 冷却结束前一刻仍不切换，到点之后切换
    let outcome = rig.see(50.0, 500.0, 599);
    assert!(presets(&outcome.intents).is_empty());
    let outcome = rig.see(50.0, 500.0, 600);
    assert_eq!(presets(&outcome.intents), vec!["P3"]);
  }

  #[test]
  fn missing_preset_commits_region_without_cooldown() {
    let mut config = TrackingConfig::default();
    config.quadrants.insert(Quadrant::BottomRight, RegionTarget::with_preset("P4"));
    let mut rig = Rig::new(config, Layout::Quadrants);

    rig.see(50.0, 50.0, 0);
    let outcome = rig.see(700.0, 50.0, 100);
    assert!(presets(&outcome.intents).is_empty());
    assert_eq!(
      rig.machine.current_region(),
      Some(&RegionId::Quadrant(Quadrant::TopRight))
    );
    assert!(outcome.event.is_some());

    // 没有启动冷却，紧接着的切换可以立即发出
    let outcome = rig.see(700.0, 500.0, 150);
    assert_eq!(presets(&outcome.intents), vec!["P4"]);
  }

  #[test]
  fn zoom_on_entry_fires_once_per_entry() {
    let mut config = TrackingConfig::default();
    config.zones = vec![
      ZoneConfig::new("left", 0.0, 0.5).with_preset("L"),
      ZoneConfig::new("right", 0.5, 1.0)
        .with_preset("R")
        .with_zoom_on_entry(0.6),
    ];
    let mut rig = Rig::new(config, Layout::Zones);

    rig.see(100.0, 300.0, 0);
    let outcome = rig.see(700.0, 300.0, 100);
    let zooms = outcome
      .intents
      .iter()
      .filter(|i| matches!(i, MotionIntent::Zoom { .. }))
      .count();
    assert_eq!(zooms, 1);
    assert_eq!(rig.machine.state().entry_repeats(&RegionId::Zone("right".into())), 1);

    for t in 1..10 {
      let outcome = rig.see(700.0, 300.0, 100 + t * 50);
      assert!(!outcome.intents.iter().any(|i| matches!(i, MotionIntent::Zoom { .. })));
    }

    rig.see(100.0, 300.0, 1000);
    let outcome = rig.see(700.0, 300.0, 2000);
    assert!(outcome.intents.contains(&MotionIntent::Zoom { level: 0.6 }));
  }

  #[test]
  fn first_acquisition_does_not_zoom() {
    let mut config = TrackingConfig::default();
    config.zones = vec![
      ZoneConfig::new("left", 0.0, 0.5).with_preset("L"),
      ZoneConfig::new("right", 0.5, 1.0)
        .with_preset("R")
        .with_zoom_on_entry(0.6),
    ];
    let mut rig = Rig::new(config, Layout::Zones);

    let outcome = rig.see(700.0, 300.0, 0);
    assert!(outcome.event.is_some());
    assert!(!outcome.intents.iter().any(|i| matches!(i, MotionIntent::Zoom { .. })));
    assert_eq!(rig.machine.state().entry_repeats(&RegionId::Zone("right".into())), 0);
  }

  #[test]
  fn preset_failure_falls_back_to_fine_tracking() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    rig.see(50.0, 50.0, 0);
    let outcome = rig.see(700.0, 50.0, 100);
    let failed = outcome
      .intents
      .iter()
      .find(|i| matches!(i, MotionIntent::GotoPreset { .. }))
      .cloned()
      .unwrap();
    rig.machine.on_command_failed(&failed);
    assert_eq!(
      rig.machine.mode(),
      TrackingMode::FineTrackingOnly(Layout::Quadrants)
    );
    assert!(rig.machine.status().active);

    let outcome = rig.see(50.0, 50.0, 1000);
    assert_eq!(presets(&outcome.intents), vec!["P1"]);
    assert_eq!(rig.machine.mode(), TrackingMode::RegionTracking(Layout::Quadrants));
  }

  #[test]
  fn stop_resets_state_and_stops_motion() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    let outcome = rig.see(50.0, 50.0, 0);
    assert!(rig.machine.status().moving);
    assert!(outcome.intents.iter().any(|i| matches!(i, MotionIntent::ContinuousMove { .. })));

    assert_eq!(rig.machine.stop(), Some(MotionIntent::Stop));
    let status = rig.machine.status();
    assert_eq!(status.mode, TrackingMode::Disabled);
    assert_eq!(status.current_region, None);
    assert!(!status.active);
    assert!(!status.moving);
    assert_eq!(rig.machine.stop(), None);

    assert!(rig.tick(100).is_empty());
  }

  #[test]
  fn empty_cache_stops_motion_and_keeps_region() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    rig.see(50.0, 50.0, 0);
    rig.cache.put_at(Vec::new(), rig.at(50));
    let outcome = rig.tick(50);
    assert_eq!(outcome.intents, vec![MotionIntent::Stop]);
    assert_eq!(
      rig.machine.current_region(),
      Some(&RegionId::Quadrant(Quadrant::TopLeft))
    );
    assert!(rig.tick(100).is_empty());
  }

  #[test]
  fn low_confidence_and_other_classes_are_ignored() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    let now = rig.at(0);
    rig.cache.put_at(
      vec![
        Detection::new("car", 0.99, BoundingBox::new(10.0, 10.0, 50.0, 50.0), now),
        Detection::new("person", 0.2, BoundingBox::new(700.0, 10.0, 750.0, 50.0), now),
      ],
      now,
    );
    let outcome = rig.tick(0);
    assert!(outcome.event.is_none());
    assert_eq!(rig.machine.current_region(), None);
  }

  #[test]
  fn manual_override_pauses_tracking() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    rig.see(50.0, 50.0, 0);
    assert_eq!(rig.machine.manual_override(), Some(MotionIntent::Stop));
    assert!(!rig.machine.status().active);
    assert!(rig.see(700.0, 50.0, 100).is_empty());

    assert_eq!(rig.machine.resume(rig.at(200)), None);
    assert_eq!(rig.machine.mode(), TrackingMode::RegionTracking(Layout::Quadrants));
    let outcome = rig.see(700.0, 50.0, 300);
    assert!(presets(&outcome.intents).is_empty());
    assert!(outcome.event.is_some());
  }

  #[test]
  fn manual_motion_is_stopped_on_resume_and_stop() {
    let mut rig = Rig::new(quadrant_config(), Layout::Quadrants);
    assert_eq!(rig.machine.manual_override(), None);
    let pan = MotionIntent::ContinuousMove {
      pan: 0.8,
      tilt: 0.0,
      duration: Duration::from_secs(60),
    };

    rig.machine.note_manual(&pan, rig.at(0));
    assert!(rig.machine.state().is_moving());
    assert_eq!(rig.machine.resume(rig.at(100)), Some(MotionIntent::Stop));
    assert!(!rig.machine.state().is_moving());

    rig.machine.manual_override();
    rig.machine.note_manual(&pan, rig.at(200));
    assert_eq!(rig.machine.stop(), Some(MotionIntent::Stop));

    rig.machine.start(Layout::Quadrants, rig.at(300));
    rig.machine.manual_override();
    rig.machine.note_manual(&pan, rig.at(400));
    rig.machine.note_manual(&MotionIntent::Stop, rig.at(500));
    assert_eq!(rig.machine.stop(), None);
  }

  #[test]
  fn returns_home_after_inactivity_once() {
    let mut config = quadrant_config();
    config.home = Some(HomeConfig {
      preset: "HOME".to_string(),
      inactivity_secs: 2.0,
    });
    let mut rig = Rig::new(config, Layout::Quadrants);
    rig.see(50.0, 50.0, 0);
    rig.cache.put_at(Vec::new(), rig.at(100));

    assert!(presets(&rig.tick(1000).intents).is_empty());
    assert_eq!(presets(&rig.tick(2000).intents), vec!["HOME"]);
    assert_eq!(rig.machine.current_region(), None);
    assert!(presets(&rig.tick(5000).intents).is_empty());

    // 再次看到目标后重新计时
    rig.see(50.0, 50.0, 6000);
    rig.cache.put_at(Vec::new(), rig.at(6100));
    assert_eq!(presets(&rig.tick(8000).intents), vec!["HOME"]);
  }
}
