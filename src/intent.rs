// 该文件是 Shanan （山南西风） 项目的一部分。
// src/intent.rs - 云台运动意图
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

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// 状态机产出、命令下发器恰好消费一次的运动意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionIntent {
  GotoPreset {
    token: String,
    speed: f32,
  },
  ContinuousMove {
    pan: f32,
    tilt: f32,
    #[serde(with = "duration_secs")]
    duration: Duration,
  },
  Zoom {
    level: f32,
  },
  Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
  GotoPreset,
  ContinuousMove,
  Zoom,
  Stop,
}

impl MotionIntent {
  pub fn goto_preset(token: impl Into<String>, speed: f32) -> Self {
    MotionIntent::GotoPreset {
      token: token.into(),
      speed,
    }
  }

  pub fn kind(&self) -> IntentKind {
    match self {
      MotionIntent::GotoPreset { .. } => IntentKind::GotoPreset,
      MotionIntent::ContinuousMove { .. } => IntentKind::ContinuousMove,
      MotionIntent::Zoom { .. } => IntentKind::Zoom,
      MotionIntent::Stop => IntentKind::Stop,
    }
  }

  pub fn preset_token(&self) -> Option<&str> {
    match self {
      MotionIntent::GotoPreset { token, .. } => Some(token),
      _ => None,
    }
  }

  /// 离散命令（预置位、变焦）不能被连续微调覆盖
  pub fn is_discrete(&self) -> bool {
    matches!(
      self,
      MotionIntent::GotoPreset { .. } | MotionIntent::Zoom { .. }
    )
  }
}

impl fmt::Display for MotionIntent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MotionIntent::GotoPreset { token, speed } => {
        write!(f, "GotoPreset({}, speed={:.2})", token, speed)
      }
      MotionIntent::ContinuousMove {
        pan,
        tilt,
        duration,
      } => write!(
        f,
        "ContinuousMove(pan={:+.3}, tilt={:+.3}, {:.2?})",
        pan, tilt, duration
      ),
      MotionIntent::Zoom { level } => write!(f, "Zoom({:.2})", level),
      MotionIntent::Stop => write!(f, "Stop"),
    }
  }
}

mod duration_secs {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs)
      .map_err(|_| serde::de::Error::custom(format!("非法的秒数: {}", secs)))
  }
}
