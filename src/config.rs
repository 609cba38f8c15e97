// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 跟踪配置
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

//! # 跟踪配置
//!
//! 运行期只读。所有字段都有默认值，JSON 文件中只需写出需要覆盖的部分：
//!
//! ```json
//! {
//!   "mode": { "layout": "quadrants", "auto_start": true },
//!   "quadrants": {
//!     "top_left": { "preset": "P1" },
//!     "top_right": { "preset": "P2", "zoom_on_entry": 0.3 }
//!   },
//!   "preset": { "cooldown_secs": 0.4 }
//! }
//! ```

use std::{collections::BTreeMap, collections::HashSet, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::{Layout, Quadrant};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("区域 {zone} 的范围无效: [{min}, {max}]")]
  InvalidZoneRange { zone: String, min: f32, max: f32 },
  #[error("区域标识重复: {0}")]
  DuplicateZone(String),
  #[error("配置项 {field} 无效: {reason}")]
  InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
  ConfigError::InvalidValue {
    field,
    reason: reason.into(),
  }
}

/// 校验过的秒数一定能转换；未校验的配置超出范围时取边界值
fn secs(value: f64) -> Duration {
  Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
    Duration::MAX
  } else {
    Duration::ZERO
  })
}

fn check_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
  if Duration::try_from_secs_f64(value).is_err() {
    return Err(invalid(field, format!("{} 不是合法的秒数", value)));
  }
  Ok(())
}

fn check_positive_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
  check_secs(field, value)?;
  if value <= 0.0 {
    return Err(invalid(field, "必须大于 0"));
  }
  Ok(())
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
  if !value.is_finite() || !(0.0..=1.0).contains(&value) {
    return Err(invalid(field, format!("{} 不在 [0, 1] 范围内", value)));
  }
  Ok(())
}

/// 区域映射的预置位与进入时的变焦
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionTarget {
  #[serde(default)]
  pub preset: Option<String>,
  #[serde(default)]
  pub zoom_on_entry: Option<f32>,
}

impl RegionTarget {
  pub fn with_preset(preset: impl Into<String>) -> Self {
    Self {
      preset: Some(preset.into()),
      zoom_on_entry: None,
    }
  }
}

/// 水平条带区域，`x_range` 为帧宽度的比例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
  pub id: String,
  pub x_range: [f32; 2],
  #[serde(flatten)]
  pub target: RegionTarget,
  #[serde(default)]
  pub priority: i32,
}

impl ZoneConfig {
  pub fn new(id: impl Into<String>, x_min: f32, x_max: f32) -> Self {
    Self {
      id: id.into(),
      x_range: [x_min, x_max],
      target: RegionTarget::default(),
      priority: 0,
    }
  }

  pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
    self.target.preset = Some(preset.into());
    self
  }

  pub fn with_zoom_on_entry(mut self, level: f32) -> Self {
    self.target.zoom_on_entry = Some(level);
    self
  }

  pub fn with_priority(mut self, priority: i32) -> Self {
    self.priority = priority;
    self
  }

  /// 将帧宽度等分为 `count` 个条带
  pub fn equal_bands(ids: &[&str]) -> Vec<ZoneConfig> {
    let count = ids.len().max(1) as f32;
    ids
      .iter()
      .enumerate()
      .map(|(i, id)| ZoneConfig::new(*id, i as f32 / count, (i + 1) as f32 / count))
      .collect()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
  pub layout: Layout,
  pub auto_start: bool,
}

impl Default for ModeConfig {
  fn default() -> Self {
    Self {
      layout: Layout::Zones,
      auto_start: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  /// 每隔多少帧提交一次检测
  pub interval: u32,
  pub timeout_secs: f64,
  pub max_age_secs: f64,
  pub min_confidence: f32,
  /// 为空表示接受所有类别
  pub target_classes: Vec<String>,
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      interval: 3,
      timeout_secs: 1.0,
      max_age_secs: 1.5,
      min_confidence: 0.5,
      target_classes: vec!["person".to_string()],
    }
  }
}

impl DetectionConfig {
  pub fn timeout(&self) -> Duration {
    secs(self.timeout_secs)
  }

  pub fn max_age(&self) -> Duration {
    secs(self.max_age_secs)
  }

  pub fn accepts_class(&self, class_name: &str) -> bool {
    self.target_classes.is_empty() || self.target_classes.iter().any(|c| c == class_name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
  pub history_length: usize,
  pub min_samples: usize,
  pub movement_threshold: f32,
  pub association_distance: f32,
  pub subject_max_idle_ticks: u64,
}

impl Default for MotionConfig {
  fn default() -> Self {
    Self {
      history_length: 30,
      min_samples: 5,
      movement_threshold: 50.0,
      association_distance: 100.0,
      subject_max_idle_ticks: 30,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineTuneConfig {
  pub min_velocity: f32,
  /// 最大偏移占半帧宽/高的比例
  pub max_offset_ratio: f32,
  pub move_duration_secs: f64,
}

impl Default for FineTuneConfig {
  fn default() -> Self {
    Self {
      min_velocity: 0.01,
      max_offset_ratio: 1.0,
      move_duration_secs: 0.15,
    }
  }
}

impl FineTuneConfig {
  pub fn move_duration(&self) -> Duration {
    secs(self.move_duration_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
  pub cooldown_secs: f64,
  pub speed: f32,
}

impl Default for PresetConfig {
  fn default() -> Self {
    Self {
      cooldown_secs: 0.4,
      speed: 1.0,
    }
  }
}

impl PresetConfig {
  pub fn cooldown(&self) -> Duration {
    secs(self.cooldown_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
  pub min_spacing_secs: f64,
  pub driver_timeout_secs: f64,
}

impl Default for CommandConfig {
  fn default() -> Self {
    Self {
      min_spacing_secs: 0.1,
      driver_timeout_secs: 2.0,
    }
  }
}

impl CommandConfig {
  pub fn min_spacing(&self) -> Duration {
    secs(self.min_spacing_secs)
  }

  pub fn driver_timeout(&self) -> Duration {
    secs(self.driver_timeout_secs)
  }
}

/// 长时间无目标时返回的“家”预置位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeConfig {
  pub preset: String,
  #[serde(default = "HomeConfig::default_inactivity_secs")]
  pub inactivity_secs: f64,
}

impl HomeConfig {
  fn default_inactivity_secs() -> f64 {
    5.0
  }

  pub fn inactivity(&self) -> Duration {
    secs(self.inactivity_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
  pub capacity: usize,
}

impl Default for EventConfig {
  fn default() -> Self {
    Self { capacity: 1024 }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
  pub zones: Vec<ZoneConfig>,
  pub quadrants: BTreeMap<Quadrant, RegionTarget>,
  pub mode: ModeConfig,
  pub detection: DetectionConfig,
  pub motion: MotionConfig,
  pub fine_tune: FineTuneConfig,
  pub preset: PresetConfig,
  pub command: CommandConfig,
  pub home: Option<HomeConfig>,
  pub events: EventConfig,
}

impl Default for TrackingConfig {
  fn default() -> Self {
    Self {
      zones: ZoneConfig::equal_bands(&["zone_left", "zone_center", "zone_right"]),
      quadrants: BTreeMap::new(),
      mode: ModeConfig::default(),
      detection: DetectionConfig::default(),
      motion: MotionConfig::default(),
      fine_tune: FineTuneConfig::default(),
      preset: PresetConfig::default(),
      command: CommandConfig::default(),
      home: None,
      events: EventConfig::default(),
    }
  }
}

impl TrackingConfig {
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: TrackingConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn quadrant_target(&self, quadrant: Quadrant) -> Option<&RegionTarget> {
    self.quadrants.get(&quadrant)
  }

  pub fn zone(&self, id: &str) -> Option<&ZoneConfig> {
    self.zones.iter().find(|z| z.id == id)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let mut ids = HashSet::new();
    for zone in &self.zones {
      let [min, max] = zone.x_range;
      if !min.is_finite() || !max.is_finite() || min < 0.0 || max > 1.0 || min > max {
        return Err(ConfigError::InvalidZoneRange {
          zone: zone.id.clone(),
          min,
          max,
        });
      }
      if !ids.insert(zone.id.as_str()) {
        return Err(ConfigError::DuplicateZone(zone.id.clone()));
      }
      if let Some(level) = zone.target.zoom_on_entry {
        check_unit("zones.zoom_on_entry", level)?;
      }
    }

    for target in self.quadrants.values() {
      if let Some(level) = target.zoom_on_entry {
        check_unit("quadrants.zoom_on_entry", level)?;
      }
    }

    if self.detection.interval == 0 {
      return Err(invalid("detection.interval", "必须大于 0"));
    }
    check_positive_secs("detection.timeout_secs", self.detection.timeout_secs)?;
    check_positive_secs("detection.max_age_secs", self.detection.max_age_secs)?;
    check_unit("detection.min_confidence", self.detection.min_confidence)?;

    if self.motion.min_samples < 2 {
      return Err(invalid("motion.min_samples", "至少需要 2 个样本"));
    }
    if self.motion.history_length < self.motion.min_samples {
      return Err(invalid(
        "motion.history_length",
        format!("不能小于 min_samples ({})", self.motion.min_samples),
      ));
    }
    if !self.motion.movement_threshold.is_finite() || self.motion.movement_threshold < 0.0 {
      return Err(invalid("motion.movement_threshold", "必须是非负数"));
    }
    if !self.motion.association_distance.is_finite() || self.motion.association_distance <= 0.0 {
      return Err(invalid("motion.association_distance", "必须是正数"));
    }

    check_unit("fine_tune.min_velocity", self.fine_tune.min_velocity)?;
    if !self.fine_tune.max_offset_ratio.is_finite() || self.fine_tune.max_offset_ratio <= 0.0 {
      return Err(invalid("fine_tune.max_offset_ratio", "必须是正数"));
    }
    check_secs("fine_tune.move_duration_secs", self.fine_tune.move_duration_secs)?;

    check_secs("preset.cooldown_secs", self.preset.cooldown_secs)?;
    check_unit("preset.speed", self.preset.speed)?;
    check_secs("command.min_spacing_secs", self.command.min_spacing_secs)?;
    check_positive_secs("command.driver_timeout_secs", self.command.driver_timeout_secs)?;

    if let Some(home) = &self.home {
      if home.preset.is_empty() {
        return Err(invalid("home.preset", "不能为空"));
      }
      check_secs("home.inactivity_secs", home.inactivity_secs)?;
    }

    if self.events.capacity == 0 {
      return Err(invalid("events.capacity", "必须大于 0"));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let config = TrackingConfig::default();
    config.validate().unwrap();
    assert_eq!(config.zones.len(), 3);
    assert_eq!(config.detection.interval, 3);
    assert!((config.preset.cooldown().as_secs_f64() - 0.4).abs() < 1e-9);
    assert_eq!(config.motion.history_length, 30);
  }

  #[test]
  fn partial_json_keeps_defaults() {
    let config = TrackingConfig::from_json_str(
      r#"{
        "mode": { "layout": "quadrants", "auto_start": true },
        "quadrants": {
          "top_left": { "preset": "P1" },
          "top_right": { "preset": "P2", "zoom_on_entry": 0.3 }
        },
        "home": { "preset": "Preset004" }
      }"#,
    )
    .unwrap();

    assert_eq!(config.mode.layout, Layout::Quadrants);
    assert!(config.mode.auto_start);
    assert_eq!(
      config.quadrant_target(Quadrant::TopRight),
      Some(&RegionTarget {
        preset: Some("P2".to_string()),
        zoom_on_entry: Some(0.3)
      })
    );
    assert!(config.quadrant_target(Quadrant::BottomLeft).is_none());
    assert_eq!(config.home.unwrap().inactivity(), Duration::from_secs(5));
    assert_eq!(config.detection.target_classes, vec!["person".to_string()]);
  }

  #[test]
  fn zone_preset_is_flattened() {
    let config = TrackingConfig::from_json_str(
      r#"{ "zones": [
        { "id": "left", "x_range": [0.0, 0.5], "preset": "Preset001" },
        { "id": "right", "x_range": [0.5, 1.0], "priority": 2 }
      ] }"#,
    )
    .unwrap();
    let left = config.zone("left").unwrap();
    assert_eq!(left.target.preset.as_deref(), Some("Preset001"));
    assert_eq!(config.zone("right").unwrap().priority, 2);
  }

  #[test]
  fn invalid_values_are_rejected() {
    let mut config = TrackingConfig::default();
    config.zones.push(ZoneConfig::new("zone_left", 0.0, 0.2));
    assert!(matches!(
      config.validate(),
      Err(ConfigError::DuplicateZone(_))
    ));

    let mut config = TrackingConfig::default();
    config.zones = vec![ZoneConfig::new("bad", 0.8, 0.2)];
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidZoneRange { .. })
    ));

    let mut config = TrackingConfig::default();
    config.detection.interval = 0;
    assert!(config.validate().is_err());

    let mut config = TrackingConfig::default();
    config.motion.history_length = 3;
    assert!(config.validate().is_err());

    let mut config = TrackingConfig::default();
    config.preset.cooldown_secs = -1.0;
    assert!(config.validate().is_err());
  }

  #[test]
  fn durations_out_of_range_are_rejected() {
    for json in [
      r#"{ "detection": { "max_age_secs": 1e30 } }"#,
      r#"{ "preset": { "cooldown_secs": 1e30 } }"#,
      r#"{ "home": { "preset": "P0", "inactivity_secs": 1e300 } }"#,
      r#"{ "detection": { "timeout_secs": 0.0 } }"#,
      r#"{ "detection": { "max_age_secs": 0.0 } }"#,
      r#"{ "command": { "driver_timeout_secs": 0.0 } }"#,
    ] {
      assert!(
        matches!(
          TrackingConfig::from_json_str(json),
          Err(ConfigError::InvalidValue { .. })
        ),
        "{} 应当被拒绝",
        json
      );
    }

    // 间隔类的 0 仍然合法
    let config = TrackingConfig::from_json_str(
      r#"{ "command": { "min_spacing_secs": 0.0 }, "preset": { "cooldown_secs": 0.0 } }"#,
    )
    .unwrap();
    assert_eq!(config.command.min_spacing(), Duration::ZERO);
  }

  #[test]
  fn unvalidated_durations_saturate() {
    let mut config = TrackingConfig::default();
    config.detection.max_age_secs = 1e30;
    config.preset.cooldown_secs = f64::NAN;
    assert_eq!(config.detection.max_age(), Duration::MAX);
    assert_eq!(config.preset.cooldown(), Duration::ZERO);
  }

  #[test]
  fn equal_bands_cover_the_frame() {
    let zones = ZoneConfig::equal_bands(&["a", "b", "c", "d"]);
    assert_eq!(zones[0].x_range, [0.0, 0.25]);
    assert_eq!(zones[3].x_range, [0.75, 1.0]);
  }
}
