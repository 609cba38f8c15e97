// 该文件是 Shanan （山南西风） 项目的一部分。
// src/classifier.rs - 空间区域划分
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

use std::{cmp::Reverse, fmt};

use serde::{Deserialize, Serialize};

use crate::{config::ZoneConfig, detection::Point, frame::FrameSize};

mod identity;
mod motion;

pub use self::identity::{SubjectAssociator, SubjectId};
pub use self::motion::{Direction, MotionHistory};

/// 区域划分方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
  /// 水平条带
  Zones,
  /// 四象限
  Quadrants,
}

impl fmt::Display for Layout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Layout::Zones => write!(f, "zones"),
      Layout::Quadrants => write!(f, "quadrants"),
    }
  }
}

impl std::str::FromStr for Layout {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "zones" | "zone" => Ok(Layout::Zones),
      "quadrants" | "quadrant" => Ok(Layout::Quadrants),
      other => Err(format!("未知的区域划分方式: {}", other)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
  TopLeft,
  TopRight,
  BottomLeft,
  BottomRight,
}

impl Quadrant {
  pub const ALL: [Quadrant; 4] = [
    Quadrant::TopLeft,
    Quadrant::TopRight,
    Quadrant::BottomLeft,
    Quadrant::BottomRight,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Quadrant::TopLeft => "top_left",
      Quadrant::TopRight => "top_right",
      Quadrant::BottomLeft => "bottom_left",
      Quadrant::BottomRight => "bottom_right",
    }
  }
}

impl fmt::Display for Quadrant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 区域标识：条带 id 或象限
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionId {
  Zone(String),
  Quadrant(Quadrant),
}

impl fmt::Display for RegionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RegionId::Zone(id) => write!(f, "zone:{}", id),
      RegionId::Quadrant(q) => write!(f, "quadrant:{}", q),
    }
  }
}

/// 按帧中点切分四象限，恰好落在中线上的点归左/上
pub fn quadrant_for(point: Point, frame_width: u32, frame_height: u32) -> Quadrant {
  let mid_x = frame_width as f32 / 2.0;
  let mid_y = frame_height as f32 / 2.0;
  let left = point.x <= mid_x;
  let top = point.y <= mid_y;

  match (top, left) {
    (true, true) => Quadrant::TopLeft,
    (true, false) => Quadrant::TopRight,
    (false, true) => Quadrant::BottomLeft,
    (false, false) => Quadrant::BottomRight,
  }
}

/// 找到点所在的水平条带；多个条带重叠时取优先级最高者，同优先级取配置中靠前的
pub fn zone_for(zones: &[ZoneConfig], point: Point, frame_width: u32) -> Option<&ZoneConfig> {
  if frame_width == 0 || !point.x.is_finite() {
    return None;
  }
  let norm_x = (point.x / frame_width as f32).clamp(0.0, 1.0);

  zones
    .iter()
    .enumerate()
    .filter(|(_, zone)| zone.x_range[0] <= norm_x && norm_x <= zone.x_range[1])
    .max_by_key(|(index, zone)| (zone.priority, Reverse(*index)))
    .map(|(_, zone)| zone)
}

/// 纯函数形式的区域分类器，不保存历史
#[derive(Debug, Clone)]
pub struct SpatialClassifier {
  zones: Vec<ZoneConfig>,
}

impl SpatialClassifier {
  pub fn new(zones: Vec<ZoneConfig>) -> Self {
    Self { zones }
  }

  pub fn zones(&self) -> &[ZoneConfig] {
    &self.zones
  }

  pub fn zone_for(&self, point: Point, frame_width: u32) -> Option<&str> {
    zone_for(&self.zones, point, frame_width).map(|zone| zone.id.as_str())
  }

  pub fn quadrant_for(&self, point: Point, frame_width: u32, frame_height: u32) -> Quadrant {
    quadrant_for(point, frame_width, frame_height)
  }

  pub fn classify(&self, layout: Layout, point: Point, size: FrameSize) -> Option<RegionId> {
    match layout {
      Layout::Zones => self
        .zone_for(point, size.width())
        .map(|id| RegionId::Zone(id.to_string())),
      Layout::Quadrants => Some(RegionId::Quadrant(self.quadrant_for(
        point,
        size.width(),
        size.height(),
      ))),
    }
  }
}
