// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detection.rs - 检测结果定义
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

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::frame::FrameSize;

/// 帧像素坐标系中的点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub fn distance(&self, other: &Point) -> f32 {
    ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
  }
}

/// 检测框 [x1, y1, x2, y2]，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn center(&self) -> Point {
    Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
  }

  pub fn area(&self) -> f32 {
    (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
  }

  /// 裁剪到帧范围内；裁剪后面积为零（或坐标非法）时返回 `None`
  pub fn clamp_to(&self, size: FrameSize) -> Option<BoundingBox> {
    if ![self.x1, self.y1, self.x2, self.y2]
      .iter()
      .all(|v| v.is_finite())
    {
      return None;
    }

    let (w, h) = (size.width() as f32, size.height() as f32);
    let clamped = BoundingBox {
      x1: self.x1.clamp(0.0, w),
      y1: self.y1.clamp(0.0, h),
      x2: self.x2.clamp(0.0, w),
      y2: self.y2.clamp(0.0, h),
    };

    if clamped.x2 > clamped.x1 && clamped.y2 > clamped.y1 {
      Some(clamped)
    } else {
      None
    }
  }
}

/// 单个目标检测结果，生成后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_name: String,
  pub confidence: f32,
  pub bbox: BoundingBox,
  pub captured_at: Instant,
}

impl Detection {
  pub fn new(
    class_name: impl Into<String>,
    confidence: f32,
    bbox: BoundingBox,
    captured_at: Instant,
  ) -> Self {
    Self {
      class_name: class_name.into(),
      confidence: confidence.clamp(0.0, 1.0),
      bbox,
      captured_at,
    }
  }

  pub fn center(&self) -> Point {
    self.bbox.center()
  }

  pub fn clamped(&self, size: FrameSize) -> Option<Detection> {
    self.bbox.clamp_to(size).map(|bbox| Detection {
      bbox,
      ..self.clone()
    })
  }
}
