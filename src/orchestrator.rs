// 该文件是 Shanan （山南西风） 项目的一部分。
// src/orchestrator.rs - 帧与检测的编排
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
  sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  cache::DetectionCache,
  classifier::Layout,
  config::{ConfigError, TrackingConfig},
  detection::Detection,
  detector::Detector,
  driver::CameraDriver,
  event::{EventLog, TrackingEvent},
  frame::Frame,
  input::FrameSource,
  intent::MotionIntent,
  issuer::{CommandIssuer, IssuerError, Submission},
  stats::{Statistics, StatsSnapshot},
  tracking::{StateMachine, TrackingMode, TrackingStatus},
};

mod detection_worker;
mod latest;

pub use self::detection_worker::{DetectionWorker, WorkerEvent};
pub use self::latest::{LatestFrame, Take};

/// 等待新帧的间隔，期间照常处理控制消息与命令结果
const FRAME_WAIT: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum OrchestratorError {
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("命令下发器错误: {0}")]
  IssuerError(#[from] IssuerError),
  #[error("无法启动线程: {0}")]
  SpawnError(#[from] std::io::Error),
  #[error("控制通道已关闭")]
  ControlClosed,
}

/// 外部控制消息
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
  Start(Layout),
  Stop,
  SetLayout(Layout),
  ManualOverride,
  Resume,
  /// 只在手动控制模式下转发给云台
  Manual(MotionIntent),
}

/// 控制与查询句柄，可在线程之间克隆
#[derive(Clone)]
pub struct TrackingHandle {
  control: Sender<Control>,
  cache: Arc<DetectionCache>,
  events: Arc<EventLog>,
  status: Arc<RwLock<TrackingStatus>>,
  stats: Arc<Statistics>,
}

impl TrackingHandle {
  pub fn send(&self, control: Control) -> Result<(), OrchestratorError> {
    self
      .control
      .send(control)
      .map_err(|_| OrchestratorError::ControlClosed)
  }

  pub fn start(&self, layout: Layout) -> Result<(), OrchestratorError> {
    self.send(Control::Start(layout))
  }

  pub fn stop(&self) -> Result<(), OrchestratorError> {
    self.send(Control::Stop)
  }

  pub fn set_layout(&self, layout: Layout) -> Result<(), OrchestratorError> {
    self.send(Control::SetLayout(layout))
  }

  pub fn manual_override(&self) -> Result<(), OrchestratorError> {
    self.send(Control::ManualOverride)
  }

  pub fn resume(&self) -> Result<(), OrchestratorError> {
    self.send(Control::Resume)
  }

  pub fn manual(&self, intent: MotionIntent) -> Result<(), OrchestratorError> {
    self.send(Control::Manual(intent))
  }

  /// 当前缓存的检测结果与其年龄
  pub fn detections(&self) -> (Arc<[Detection]>, Duration) {
    self.cache.get()
  }

  pub fn drain_events(&self) -> Vec<TrackingEvent> {
    self.events.drain()
  }

  pub fn status(&self) -> TrackingStatus {
    self
      .status
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn stats(&self) -> StatsSnapshot {
    self.stats.snapshot()
  }
}

/// 帧与检测的编排器
///
/// 帧线程持续拉帧并放入只保留最新一帧的槽位；每处理 K 帧向检测线程提交一帧；
/// 每一帧都用当前缓存驱动一次状态机，状态机产出的意图交给命令下发器。
pub struct Orchestrator {
  config: TrackingConfig,
  cache: Arc<DetectionCache>,
  events: Arc<EventLog>,
  status: Arc<RwLock<TrackingStatus>>,
  stats: Arc<Statistics>,
  control_tx: Sender<Control>,
  control_rx: Receiver<Control>,
}

impl Orchestrator {
  pub fn new(config: TrackingConfig) -> Result<Self, OrchestratorError> {
    config.validate()?;
    let (control_tx, control_rx) = mpsc::channel();
    let status = StateMachine::new(config.clone()).status();
    Ok(Self {
      cache: Arc::new(DetectionCache::new(config.detection.max_age())),
      events: Arc::new(EventLog::new(config.events.capacity)),
      status: Arc::new(RwLock::new(status)),
      stats: Arc::new(Statistics::default()),
      control_tx,
      control_rx,
      config,
    })
  }

  pub fn config(&self) -> &TrackingConfig {
    &self.config
  }

  pub fn handle(&self) -> TrackingHandle {
    TrackingHandle {
      control: self.control_tx.clone(),
      cache: self.cache.clone(),
      events: self.events.clone(),
      status: self.status.clone(),
      stats: self.stats.clone(),
    }
  }

  /// 运行到输入结束或 `shutdown` 被置位
  pub fn run<S, D, C>(
    &mut self,
    source: S,
    detector: D,
    driver: C,
    shutdown: Arc<AtomicBool>,
  ) -> Result<StatsSnapshot, OrchestratorError>
  where
    S: FrameSource,
    D: Detector,
    C: CameraDriver,
  {
    let issuer = CommandIssuer::spawn(driver, &self.config.command)?;
    let worker = DetectionWorker::spawn(detector, self.config.detection.timeout())?;
    let latest = Arc::new(LatestFrame::new());
    let frames_done = Arc::new(AtomicBool::new(false));
    let frame_thread = spawn_frame_thread(
      source,
      latest.clone(),
      frames_done.clone(),
      shutdown.clone(),
      self.stats.clone(),
    )?;

    let mut machine = StateMachine::new(self.config.clone());
    if self.config.mode.auto_start {
      machine.start(self.config.mode.layout, Instant::now());
    }

    let mut run = Run {
      machine,
      issuer,
      worker,
      epoch: 0,
      sampled: 0,
      interval: u64::from(self.config.detection.interval.max(1)),
      cache: &self.cache,
      events: &self.events,
      stats: &self.stats,
    };
    run.publish(&self.status);
    info!("跟踪循环启动");

    loop {
      if shutdown.load(Ordering::SeqCst) {
        info!("收到退出信号");
        break;
      }

      while let Ok(control) = self.control_rx.try_recv() {
        run.apply(control);
      }
      run.collect_detections(Instant::now());
      run.collect_outcomes();

      match latest.take_timeout(FRAME_WAIT) {
        Take::Frame(frame) => run.on_frame(frame),
        Take::Empty => {}
        Take::Closed => {
          info!("输入结束");
          break;
        }
      }
      run.publish(&self.status);
    }

    // 停止接收检测结果，停下云台并清空缓存
    run.stop();
    run.publish(&self.status);

    frames_done.store(true, Ordering::SeqCst);
    latest.close();

    let Run { issuer, worker, .. } = run;
    worker.shutdown();
    issuer.shutdown()?;
    if frame_thread.join().is_err() {
      error!("帧线程异常退出");
    }

    let stats = self.stats.snapshot();
    info!(
      "跟踪循环结束: 处理 {} 帧, 丢弃 {} 帧, 提交检测 {} 次, 下发意图 {} 个",
      stats.frames_processed,
      stats.frames_dropped,
      stats.detector_submitted,
      stats.intents()
    );
    Ok(stats)
  }
}

fn spawn_frame_thread<S: FrameSource>(
  mut source: S,
  latest: Arc<LatestFrame>,
  done: Arc<AtomicBool>,
  shutdown: Arc<AtomicBool>,
  stats: Arc<Statistics>,
) -> std::io::Result<JoinHandle<()>> {
  thread::Builder::new().name("frames".to_string()).spawn(move || {
    while !done.load(Ordering::SeqCst) && !shutdown.load(Ordering::SeqCst) {
      match source.next_frame() {
        Ok(Some(frame)) => {
          Statistics::bump(&stats.frames_received);
          if latest.put(frame) {
            Statistics::bump(&stats.frames_dropped);
          }
        }
        Ok(None) => break,
        Err(e) => {
          error!("读取帧失败: {}", e);
          break;
        }
      }
    }
    latest.close();
    debug!("帧线程退出");
  })
}

/// 一次 `run` 期间的可变状态
struct Run<'a> {
  machine: StateMachine,
  issuer: CommandIssuer,
  worker: DetectionWorker,
  epoch: u64,
  sampled: u64,
  interval: u64,
  cache: &'a DetectionCache,
  events: &'a EventLog,
  stats: &'a Statistics,
}

impl Run<'_> {
  fn apply(&mut self, control: Control) {
    debug!("控制消息: {:?}", control);
    match control {
      Control::Start(layout) => {
        if !self.machine.mode().is_tracking() {
          self.cache.clear();
        }
        self.machine.start(layout, Instant::now());
      }
      Control::Stop => self.stop(),
      Control::SetLayout(layout) => self.machine.set_layout(layout),
      Control::ManualOverride => {
        if let Some(stop) = self.machine.manual_override() {
          self.submit(stop);
        }
      }
      Control::Resume => {
        if let Some(stop) = self.machine.resume(Instant::now()) {
          self.submit(stop);
        }
      }
      Control::Manual(intent) => match self.machine.mode() {
        TrackingMode::ManualOverride(_) => {
          self.machine.note_manual(&intent, Instant::now());
          self.submit(intent);
        }
        mode => warn!("当前模式 {:?} 不接受手动命令 {}", mode, intent),
      },
    }
  }

  /// 停止序列：先让在途检测作废，再停云台、清缓存
  fn stop(&mut self) {
    self.epoch += 1;
    if let Some(stop) = self.machine.stop() {
      self.submit(stop);
    }
    self.cache.clear();
  }

  fn on_frame(&mut self, frame: Frame) {
    let now = Instant::now();
    Statistics::bump(&self.stats.frames_processed);

    if self.machine.mode().is_tracking() {
      if self.sampled % self.interval == 0 {
        if self.worker.submit(frame.clone(), self.epoch, now) {
          Statistics::bump(&self.stats.detector_submitted);
        } else {
          Statistics::bump(&self.stats.detector_skipped);
        }
      }
      self.sampled += 1;
    }

    let snapshot = self.cache.snapshot_at(now);
    let outcome = self.machine.tick(&snapshot, frame.size(), now);
    Statistics::bump(&self.stats.ticks);

    for intent in outcome.intents {
      self.submit(intent);
    }
    if let Some(event) = outcome.event {
      Statistics::bump(&self.stats.events);
      self.events.push(event);
    }
  }

  fn collect_detections(&mut self, now: Instant) {
    for event in self.worker.poll(self.epoch, now) {
      match event {
        WorkerEvent::Completed { detections, .. } => {
          Statistics::bump(&self.stats.detector_completed);
          self.cache.put_at(detections, now);
        }
        WorkerEvent::Failed(_) => Statistics::bump(&self.stats.detector_errors),
        WorkerEvent::TimedOut => {
          Statistics::bump(&self.stats.detector_timeouts);
          self.cache.mark_stale();
        }
        WorkerEvent::Discarded => Statistics::bump(&self.stats.detector_discarded),
      }
    }
  }

  fn collect_outcomes(&mut self) {
    for outcome in self.issuer.poll_outcomes() {
      if outcome.is_failure() {
        Statistics::bump(&self.stats.command_failures);
        self.machine.on_command_failed(&outcome.intent);
      }
    }
  }

  fn submit(&mut self, intent: MotionIntent) {
    self.stats.record_intent(intent.kind());
    if self.issuer.submit(intent) == Submission::Dropped {
      Statistics::bump(&self.stats.intents_dropped);
    }
  }

  fn publish(&self, status: &RwLock<TrackingStatus>) {
    *status.write().unwrap_or_else(PoisonError::into_inner) = self.machine.status();
  }
}
