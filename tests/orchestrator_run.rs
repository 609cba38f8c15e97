// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/orchestrator_run.rs - 编排器端到端测试
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
  convert::Infallible,
  sync::{
    Arc, Mutex,
    atomic::AtomicBool,
    mpsc::{self, Receiver, Sender},
  },
  time::Duration,
};

use shanan_ptz::{
  classifier::{Layout, Quadrant, RegionId},
  config::{RegionTarget, TrackingConfig},
  detection::{BoundingBox, Detection},
  detector::Detector,
  driver::CameraDriver,
  frame::{Frame, FrameSize},
  input::SyntheticInput,
  intent::MotionIntent,
  orchestrator::Orchestrator,
};

/// 前 `switch_at` 帧目标在左上，之后在右上
struct ScriptedDetector {
  switch_at: u64,
}

impl Detector for ScriptedDetector {
  type Error = Infallible;

  fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
    let x = if frame.index() < self.switch_at { 100.0 } else { 700.0 };
    Ok(vec![Detection::new(
      "person",
      0.9,
      BoundingBox::new(x - 20.0, 80.0, x + 20.0, 120.0),
      frame.timestamp(),
    )])
  }
}

/// 只回答第一次检测，之后一直卡住直到测试放行
struct StallingDetector {
  answered: bool,
  release: Receiver<()>,
}

impl StallingDetector {
  fn new() -> (Self, Sender<()>) {
    let (release, wait) = mpsc::channel();
    (
      Self {
        answered: false,
        release: wait,
      },
      release,
    )
  }
}

impl Detector for StallingDetector {
  type Error = Infallible;

  fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
    if self.answered {
      let _ = self.release.recv_timeout(Duration::from_secs(5));
      return Ok(Vec::new());
    }
    self.answered = true;
    Ok(vec![Detection::new(
      "person",
      0.9,
      BoundingBox::new(680.0, 80.0, 720.0, 120.0),
      frame.timestamp(),
    )])
  }
}

#[derive(Clone, Default)]
struct RecordingDriver {
  intents: Arc<Mutex<Vec<MotionIntent>>>,
}

impl RecordingDriver {
  fn recorded(&self) -> Vec<MotionIntent> {
    self.intents.lock().unwrap().clone()
  }
}

impl CameraDriver for RecordingDriver {
  type Error = Infallible;

  fn goto_preset(&mut self, token: &str, speed: f32) -> Result<(), Self::Error> {
    self
      .intents
      .lock()
      .unwrap()
      .push(MotionIntent::goto_preset(token, speed));
    Ok(())
  }

  fn continuous_move(&mut self, pan: f32, tilt: f32, duration: Duration) -> Result<(), Self::Error> {
    self.intents.lock().unwrap().push(MotionIntent::ContinuousMove {
      pan,
      tilt,
      duration,
    });
    Ok(())
  }

  fn set_zoom(&mut self, level: f32) -> Result<(), Self::Error> {
    self.intents.lock().unwrap().push(MotionIntent::Zoom { level });
    Ok(())
  }

  fn stop(&mut self) -> Result<(), Self::Error> {
    self.intents.lock().unwrap().push(MotionIntent::Stop);
    Ok(())
  }
}

fn config() -> TrackingConfig {
  let mut config = TrackingConfig::default();
  config
    .quadrants
    .insert(Quadrant::TopLeft, RegionTarget::with_preset("P1"));
  config
    .quadrants
    .insert(Quadrant::TopRight, RegionTarget::with_preset("P2"));
  config.mode.layout = Layout::Quadrants;
  config.mode.auto_start = true;
  config.detection.interval = 1;
  config.command.min_spacing_secs = 0.0;
  config.preset.cooldown_secs = 0.1;
  config
}

fn source(frames: u64) -> SyntheticInput {
  SyntheticInput::new(FrameSize::new(800, 600).unwrap(), 200.0, Some(frames))
}

fn presets(intents: &[MotionIntent]) -> Vec<&str> {
  intents.iter().filter_map(MotionIntent::preset_token).collect()
}

#[test]
fn tracks_subject_into_next_quadrant() {
  let driver = RecordingDriver::default();
  let mut orchestrator = Orchestrator::new(config()).unwrap();
  let handle = orchestrator.handle();

  let stats = orchestrator
    .run(
      source(80),
      ScriptedDetector { switch_at: 20 },
      driver.clone(),
      Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

  let recorded = driver.recorded();
  assert_eq!(presets(&recorded), vec!["P2"]);
  assert_eq!(recorded.last(), Some(&MotionIntent::Stop));

  assert!(stats.frames_processed > 0);
  assert!(stats.detector_completed > 0);
  assert_eq!(stats.goto_preset, 1);

  let events = handle.drain_events();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].to, RegionId::Quadrant(Quadrant::TopLeft));
  assert_eq!(events[1].from, Some(RegionId::Quadrant(Quadrant::TopLeft)));
  assert_eq!(events[1].to, RegionId::Quadrant(Quadrant::TopRight));

  // 退出后跟踪停止，缓存被清空
  assert!(!handle.status().active);
  assert!(handle.detections().0.is_empty());
}

#[test]
fn stop_before_first_frame_keeps_camera_still() {
  let driver = RecordingDriver::default();
  let mut orchestrator = Orchestrator::new(config()).unwrap();
  orchestrator.handle().stop().unwrap();

  let stats = orchestrator
    .run(
      source(20),
      ScriptedDetector { switch_at: 0 },
      driver.clone(),
      Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

  assert!(driver.recorded().is_empty());
  assert_eq!(stats.detector_submitted, 0);
  assert_eq!(stats.intents(), 0);
}

#[test]
fn manual_commands_pass_through_only_in_manual_mode() {
  let driver = RecordingDriver::default();
  let mut orchestrator = Orchestrator::new(config()).unwrap();
  let handle = orchestrator.handle();
  handle.manual(MotionIntent::goto_preset("P7", 1.0)).unwrap();
  handle.manual_override().unwrap();
  handle.manual(MotionIntent::goto_preset("P9", 1.0)).unwrap();

  orchestrator
    .run(
      source(20),
      ScriptedDetector { switch_at: 0 },
      driver.clone(),
      Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

  assert_eq!(
    driver.recorded(),
    vec![MotionIntent::goto_preset("P9", 1.0)]
  );
}

#[test]
fn stop_halts_manual_motion() {
  let driver = RecordingDriver::default();
  let mut orchestrator = Orchestrator::new(config()).unwrap();
  let handle = orchestrator.handle();
  handle.manual_override().unwrap();
  handle
    .manual(MotionIntent::ContinuousMove {
      pan: 0.8,
      tilt: 0.0,
      duration: Duration::from_secs(60),
    })
    .unwrap();
  handle.stop().unwrap();

  orchestrator
    .run(
      source(20),
      ScriptedDetector { switch_at: 0 },
      driver.clone(),
      Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

  // 移动命令可能在下发前就被 Stop 清掉，但最后一定是 Stop
  assert_eq!(driver.recorded().last(), Some(&MotionIntent::Stop));
}

#[test]
fn resume_halts_manual_motion() {
  let driver = RecordingDriver::default();
  let mut orchestrator = Orchestrator::new(config()).unwrap();
  let handle = orchestrator.handle();
  let manual = MotionIntent::ContinuousMove {
    pan: -0.5,
    tilt: 0.2,
    duration: Duration::from_secs(60),
  };
  handle.manual_override().unwrap();
  handle.manual(manual.clone()).unwrap();
  handle.resume().unwrap();

  orchestrator
    .run(
      source(20),
      ScriptedDetector { switch_at: u64::MAX },
      driver.clone(),
      Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

  // 恢复后的第一个自动命令之前必须先停下手动运动
  let recorded = driver.recorded();
  assert_eq!(
    recorded.iter().find(|intent| **intent != manual),
    Some(&MotionIntent::Stop)
  );
}

#[test]
fn detector_timeout_stops_camera() {
  let driver = RecordingDriver::default();
  let mut config = config();
  config.detection.timeout_secs = 0.1;
  let mut orchestrator = Orchestrator::new(config).unwrap();
  let (detector, release) = StallingDetector::new();

  let stats = orchestrator
    .run(
      source(80),
      detector,
      driver.clone(),
      Arc::new(AtomicBool::new(false)),
    )
    .unwrap();
  drop(release);

  let recorded = driver.recorded();
  let first_stop = recorded
    .iter()
    .position(|intent| *intent == MotionIntent::Stop)
    .expect("超时后应当停下云台");
  assert!(
    recorded[first_stop..]
      .iter()
      .all(|intent| !matches!(intent, MotionIntent::ContinuousMove { .. })),
    "停下后不应再移动: {:?}",
    recorded
  );
  assert_eq!(stats.detector_timeouts, 1);
}

#[test]
fn invalid_config_is_rejected() {
  let mut config = config();
  config.detection.interval = 0;
  assert!(Orchestrator::new(config).is_err());
}
