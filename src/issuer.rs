// 该文件是 Shanan （山南西风） 项目的一部分。
// src/issuer.rs - 云台命令下发
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
  collections::VecDeque,
  sync::{
    Arc, Condvar, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
  },
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{config::CommandConfig, driver::CameraDriver, intent::MotionIntent};

/// 等待结果的上限，超出后丢弃最旧的结果
const OUTCOME_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum IssuerError {
  #[error("无法启动线程: {0}")]
  SpawnError(#[from] std::io::Error),
  #[error("命令下发线程异常退出")]
  WorkerPanicked,
}

/// 提交一个意图的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
  Queued,
  /// 替换或清掉了等待中的意图
  Replaced,
  Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandStatus {
  Completed,
  Failed(String),
  TimedOut,
}

/// 一次下发的结果
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
  pub intent: MotionIntent,
  pub status: CommandStatus,
  pub elapsed: Duration,
}

impl CommandOutcome {
  pub fn is_failure(&self) -> bool {
    !matches!(self.status, CommandStatus::Completed)
  }
}

/// 等待队列的合并规则
///
/// - `Stop` 清空队列后入队；
/// - `GotoPreset` 丢弃所有非 `Stop` 的等待意图；
/// - `Zoom` 替换等待中的 `Zoom`；
/// - `ContinuousMove` 在有 `GotoPreset` 等待时被丢弃，否则合并到已有的 `ContinuousMove`。
///
/// 按这些规则，队列长度不会超过 3。
pub fn enqueue(queue: &mut VecDeque<MotionIntent>, intent: MotionIntent) -> Submission {
  match intent {
    MotionIntent::Stop => {
      let replaced = !queue.is_empty();
      queue.clear();
      queue.push_back(MotionIntent::Stop);
      if replaced {
        Submission::Replaced
      } else {
        Submission::Queued
      }
    }
    MotionIntent::GotoPreset { .. } => {
      let before = queue.len();
      queue.retain(|pending| matches!(pending, MotionIntent::Stop));
      let replaced = queue.len() != before;
      queue.push_back(intent);
      if replaced {
        Submission::Replaced
      } else {
        Submission::Queued
      }
    }
    MotionIntent::Zoom { .. } => {
      match queue
        .iter_mut()
        .find(|pending| matches!(pending, MotionIntent::Zoom { .. }))
      {
        Some(pending) => {
          *pending = intent;
          Submission::Replaced
        }
        None => {
          queue.push_back(intent);
          Submission::Queued
        }
      }
    }
    MotionIntent::ContinuousMove { .. } => {
      if queue
        .iter()
        .any(|pending| matches!(pending, MotionIntent::GotoPreset { .. }))
      {
        return Submission::Dropped;
      }
      match queue
        .iter_mut()
        .find(|pending| matches!(pending, MotionIntent::ContinuousMove { .. }))
      {
        Some(pending) => {
          *pending = intent;
          Submission::Replaced
        }
        None => {
          queue.push_back(intent);
          Submission::Queued
        }
      }
    }
  }
}

#[derive(Debug, Default)]
struct Pending {
  queue: VecDeque<MotionIntent>,
  busy: bool,
  closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
  pending: Mutex<Pending>,
  wake: Condvar,
  outcomes: Mutex<VecDeque<CommandOutcome>>,
  dispatched: AtomicU64,
  failed: AtomicU64,
}

impl Shared {
  fn push_outcome(&self, outcome: CommandOutcome) {
    if outcome.is_failure() {
      self.failed.fetch_add(1, Ordering::Relaxed);
    }
    let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
    if outcomes.len() >= OUTCOME_CAPACITY {
      outcomes.pop_front();
    }
    outcomes.push_back(outcome);
  }
}

type Reply = Result<(), String>;

/// 串行下发运动意图的命令下发器
///
/// 下发线程一次只把一个意图交给驱动线程，并用 `driver_timeout` 等待结果；
/// 超时之后仍会等到迟到的结果再下发下一个，驱动上永远最多只有一个调用在执行。
pub struct CommandIssuer {
  shared: Arc<Shared>,
  worker: Option<JoinHandle<()>>,
}

impl CommandIssuer {
  pub fn spawn<D: CameraDriver>(driver: D, config: &CommandConfig) -> Result<Self, IssuerError> {
    let (request_tx, request_rx) = mpsc::channel::<MotionIntent>();
    let (reply_tx, reply_rx) = mpsc::channel::<Reply>();

    let driver_thread = thread::Builder::new()
      .name("ptz-driver".to_string())
      .spawn(move || drive(driver, request_rx, reply_tx))?;

    let shared = Arc::new(Shared::default());
    let worker = Worker {
      shared: shared.clone(),
      requests: request_tx,
      replies: reply_rx,
      driver_thread: Some(driver_thread),
      min_spacing: config.min_spacing(),
      driver_timeout: config.driver_timeout(),
      last_dispatch: None,
      awaiting_late_reply: false,
    };
    let worker = thread::Builder::new()
      .name("ptz-issuer".to_string())
      .spawn(move || worker.run())?;

    Ok(Self {
      shared,
      worker: Some(worker),
    })
  }

  pub fn submit(&self, intent: MotionIntent) -> Submission {
    let mut pending = self
      .shared
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    if pending.closed {
      warn!("命令下发器已关闭，丢弃 {}", intent);
      return Submission::Dropped;
    }
    let submission = enqueue(&mut pending.queue, intent);
    drop(pending);
    self.shared.wake.notify_all();
    submission
  }

  /// 取走已完成的下发结果
  pub fn poll_outcomes(&self) -> Vec<CommandOutcome> {
    let mut outcomes = self
      .shared
      .outcomes
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    outcomes.drain(..).collect()
  }

  /// 没有等待中的意图，也没有正在执行的调用
  pub fn is_idle(&self) -> bool {
    let pending = self
      .shared
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    pending.queue.is_empty() && !pending.busy
  }

  pub fn pending(&self) -> usize {
    let pending = self
      .shared
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    pending.queue.len()
  }

  pub fn dispatched(&self) -> u64 {
    self.shared.dispatched.load(Ordering::Relaxed)
  }

  pub fn failed(&self) -> u64 {
    self.shared.failed.load(Ordering::Relaxed)
  }

  /// 下发完剩余的意图（通常是最后一个 `Stop`）后退出
  pub fn shutdown(mut self) -> Result<(), IssuerError> {
    self.close_and_join()
  }

  fn close_and_join(&mut self) -> Result<(), IssuerError> {
    {
      let mut pending = self
        .shared
        .pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
      pending.closed = true;
    }
    self.shared.wake.notify_all();
    match self.worker.take() {
      Some(worker) => worker.join().map_err(|_| IssuerError::WorkerPanicked),
      None => Ok(()),
    }
  }
}

impl Drop for CommandIssuer {
  fn drop(&mut self) {
    if let Err(e) = self.close_and_join() {
      error!("关闭命令下发器失败: {}", e);
    }
  }
}

fn drive<D: CameraDriver>(mut driver: D, requests: Receiver<MotionIntent>, replies: Sender<Reply>) {
  while let Ok(intent) = requests.recv() {
    let reply = driver.execute(&intent).map_err(|e| e.to_string());
    if replies.send(reply).is_err() {
      break;
    }
  }
  debug!("驱动线程退出");
}

struct Worker {
  shared: Arc<Shared>,
  requests: Sender<MotionIntent>,
  replies: Receiver<Reply>,
  driver_thread: Option<JoinHandle<()>>,
  min_spacing: Duration,
  driver_timeout: Duration,
  last_dispatch: Option<Instant>,
  awaiting_late_reply: bool,
}

impl Worker {
  fn run(mut self) {
    loop {
      if !self.wait_for_work() {
        break;
      }
      if self.awaiting_late_reply && !self.collect_late_reply() {
        break;
      }
      self.respect_spacing();

      let intent = {
        let mut pending = self
          .shared
          .pending
          .lock()
          .unwrap_or_else(PoisonError::into_inner);
        let intent = pending.queue.pop_front();
        pending.busy = intent.is_some();
        intent
      };
      let Some(intent) = intent else {
        continue;
      };

      let outcome = self.dispatch(intent);
      if outcome.is_failure() {
        warn!("命令 {} 失败: {:?}", outcome.intent, outcome.status);
      }
      self.shared.push_outcome(outcome);

      let mut pending = self
        .shared
        .pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
      pending.busy = false;
    }

    // 关闭请求通道，驱动线程随之退出
    let Worker {
      requests,
      driver_thread,
      awaiting_late_reply,
      ..
    } = self;
    drop(requests);
    if let Some(handle) = driver_thread {
      if awaiting_late_reply {
        warn!("驱动调用仍未返回，不再等待驱动线程");
      } else if handle.join().is_err() {
        error!("驱动线程异常退出");
      }
    }
    info!("命令下发线程退出");
  }

  /// 等到有意图可下发；关闭且队列为空时返回 `false`
  fn wait_for_work(&self) -> bool {
    let mut pending = self
      .shared
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    while pending.queue.is_empty() && !pending.closed {
      pending = self
        .shared
        .wake
        .wait(pending)
        .unwrap_or_else(PoisonError::into_inner);
    }
    !pending.queue.is_empty()
  }

  /// 上一个调用超时后，必须等它真正返回才能继续
  fn collect_late_reply(&mut self) -> bool {
    loop {
      match self.replies.recv_timeout(self.driver_timeout) {
        Ok(reply) => {
          debug!("收到迟到的驱动结果: {:?}", reply);
          self.awaiting_late_reply = false;
          return true;
        }
        Err(RecvTimeoutError::Timeout) => {
          let closed = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed;
          if closed {
            return false;
          }
          warn!("驱动调用仍未返回，继续等待");
        }
        Err(RecvTimeoutError::Disconnected) => {
          error!("驱动线程已退出");
          return false;
        }
      }
    }
  }

  fn respect_spacing(&self) {
    if let Some(last) = self.last_dispatch {
      let elapsed = last.elapsed();
      if elapsed < self.min_spacing {
        thread::sleep(self.min_spacing - elapsed);
      }
    }
  }

  fn dispatch(&mut self, intent: MotionIntent) -> CommandOutcome {
    let started = Instant::now();
    self.last_dispatch = Some(started);
    self.shared.dispatched.fetch_add(1, Ordering::Relaxed);
    debug!("下发命令 {}", intent);

    if self.requests.send(intent.clone()).is_err() {
      return CommandOutcome {
        intent,
        status: CommandStatus::Failed("驱动线程已退出".to_string()),
        elapsed: started.elapsed(),
      };
    }

    let status = match self.replies.recv_timeout(self.driver_timeout) {
      Ok(Ok(())) => CommandStatus::Completed,
      Ok(Err(message)) => CommandStatus::Failed(message),
      Err(RecvTimeoutError::Timeout) => {
        self.awaiting_late_reply = true;
        CommandStatus::TimedOut
      }
      Err(RecvTimeoutError::Disconnected) => CommandStatus::Failed("驱动线程已退出".to_string()),
    };

    CommandOutcome {
      intent,
      status,
      elapsed: started.elapsed(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[derive(Debug, Error)]
  #[error("mock failure: {0}")]
  struct MockError(String);

  #[derive(Clone, Default)]
  struct MockDriver {
    calls: Arc<Mutex<Vec<(Instant, MotionIntent)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Duration,
    reject: Option<String>,
  }

  impl MockDriver {
    fn call(&mut self, intent: MotionIntent) -> Result<(), MockError> {
      let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.max_in_flight.fetch_max(now, Ordering::SeqCst);
      self.calls.lock().unwrap().push((Instant::now(), intent.clone()));
      thread::sleep(self.delay);
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      match (&intent, &self.reject) {
        (MotionIntent::GotoPreset { token, .. }, Some(reject)) if token == reject => {
          Err(MockError(token.clone()))
        }
        _ => Ok(()),
      }
    }

    fn intents(&self) -> Vec<MotionIntent> {
      self.calls.lock().unwrap().iter().map(|(_, i)| i.clone()).collect()
    }
  }

  impl CameraDriver for MockDriver {
    type Error = MockError;

    fn goto_preset(&mut self, token: &str, speed: f32) -> Result<(), Self::Error> {
      self.call(MotionIntent::goto_preset(token, speed))
    }

    fn continuous_move(&mut self, pan: f32, tilt: f32, duration: Duration) -> Result<(), Self::Error> {
      self.call(MotionIntent::ContinuousMove {
        pan,
        tilt,
        duration,
      })
    }

    fn set_zoom(&mut self, level: f32) -> Result<(), Self::Error> {
      self.call(MotionIntent::Zoom { level })
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
      self.call(MotionIntent::Stop)
    }
  }

  fn config(spacing_ms: u64, timeout_ms: u64) -> CommandConfig {
    CommandConfig {
      min_spacing_secs: spacing_ms as f64 / 1000.0,
      driver_timeout_secs: timeout_ms as f64 / 1000.0,
    }
  }

  fn mv(pan: f32) -> MotionIntent {
    MotionIntent::ContinuousMove {
      pan,
      tilt: 0.0,
      duration: Duration::from_millis(100),
    }
  }

  fn wait_outcomes(issuer: &CommandIssuer, count: usize) -> Vec<CommandOutcome> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut outcomes = Vec::new();
    while outcomes.len() < count && Instant::now() < deadline {
      outcomes.extend(issuer.poll_outcomes());
      thread::sleep(Duration::from_millis(5));
    }
    outcomes
  }

  #[test]
  fn stop_clears_pending() {
    let mut queue = VecDeque::new();
    assert_eq!(enqueue(&mut queue, mv(0.5)), Submission::Queued);
    assert_eq!(enqueue(&mut queue, MotionIntent::Zoom { level: 0.3 }), Submission::Queued);
    assert_eq!(enqueue(&mut queue, MotionIntent::Stop), Submission::Replaced);
    assert_eq!(queue, VecDeque::from(vec![MotionIntent::Stop]));
  }

  #[test]
  fn goto_preset_drops_pending_non_stop() {
    let mut queue = VecDeque::new();
    enqueue(&mut queue, MotionIntent::Stop);
    enqueue(&mut queue, MotionIntent::Zoom { level: 0.3 });
    assert_eq!(
      enqueue(&mut queue, MotionIntent::goto_preset("P2", 1.0)),
      Submission::Replaced
    );
    assert_eq!(
      queue,
      VecDeque::from(vec![MotionIntent::Stop, MotionIntent::goto_preset("P2", 1.0)])
    );

    assert_eq!(enqueue(&mut queue, mv(0.2)), Submission::Dropped);
    assert_eq!(queue.len(), 2);
  }

  #[test]
  fn moves_and_zooms_coalesce() {
    let mut queue = VecDeque::new();
    enqueue(&mut queue, mv(0.1));
    enqueue(&mut queue, MotionIntent::Zoom { level: 0.2 });
    assert_eq!(enqueue(&mut queue, mv(0.9)), Submission::Replaced);
    assert_eq!(
      enqueue(&mut queue, MotionIntent::Zoom { level: 0.7 }),
      Submission::Replaced
    );
    assert_eq!(
      queue,
      VecDeque::from(vec![mv(0.9), MotionIntent::Zoom { level: 0.7 }])
    );
  }

  #[test]
  fn dispatches_and_reports_failures() {
    let driver = MockDriver {
      reject: Some("P9".to_string()),
      ..MockDriver::default()
    };
    let issuer = CommandIssuer::spawn(driver.clone(), &config(0, 500)).unwrap();

    issuer.submit(MotionIntent::goto_preset("P9", 1.0));
    let outcomes = wait_outcomes(&issuer, 1);
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].status, CommandStatus::Failed(_)));

    issuer.submit(MotionIntent::Stop);
    let outcomes = wait_outcomes(&issuer, 1);
    assert_eq!(outcomes[0].status, CommandStatus::Completed);
    assert_eq!(issuer.failed(), 1);
    issuer.shutdown().unwrap();

    assert_eq!(
      driver.intents(),
      vec![MotionIntent::goto_preset("P9", 1.0), MotionIntent::Stop]
    );
  }

  #[test]
  fn never_more_than_one_call_in_flight() {
    let driver = MockDriver {
      delay: Duration::from_millis(20),
      ..MockDriver::default()
    };
    let issuer = CommandIssuer::spawn(driver.clone(), &config(0, 500)).unwrap();
    for i in 0..20 {
      issuer.submit(mv(i as f32 / 20.0));
      if i % 5 == 0 {
        issuer.submit(MotionIntent::Zoom { level: 0.5 });
      }
      thread::sleep(Duration::from_millis(3));
    }
    issuer.shutdown().unwrap();
    assert_eq!(driver.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(!driver.intents().is_empty());
  }

  #[test]
  fn consecutive_dispatches_respect_spacing() {
    let driver = MockDriver::default();
    let issuer = CommandIssuer::spawn(driver.clone(), &config(50, 500)).unwrap();
    issuer.submit(MotionIntent::goto_preset("P1", 1.0));
    issuer.submit(MotionIntent::Zoom { level: 0.5 });
    issuer.submit(MotionIntent::Stop);
    issuer.shutdown().unwrap();

    let calls = driver.calls.lock().unwrap();
    for pair in calls.windows(2) {
      let gap = pair[1].0.duration_since(pair[0].0);
      assert!(gap >= Duration::from_millis(45), "gap {:?}", gap);
    }
  }

  #[test]
  fn slow_driver_times_out_without_overlap() {
    let driver = MockDriver {
      delay: Duration::from_millis(150),
      ..MockDriver::default()
    };
    let issuer = CommandIssuer::spawn(driver.clone(), &config(0, 30)).unwrap();
    issuer.submit(MotionIntent::goto_preset("P1", 1.0));
    let outcomes = wait_outcomes(&issuer, 1);
    assert_eq!(outcomes[0].status, CommandStatus::TimedOut);

    issuer.submit(MotionIntent::Stop);
    let outcomes = wait_outcomes(&issuer, 1);
    assert_eq!(outcomes.len(), 1);
    issuer.shutdown().unwrap();

    assert_eq!(driver.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(driver.intents().len(), 2);
  }

  #[test]
  fn shutdown_flushes_final_stop() {
    let driver = MockDriver {
      delay: Duration::from_millis(10),
      ..MockDriver::default()
    };
    let issuer = CommandIssuer::spawn(driver.clone(), &config(0, 500)).unwrap();
    issuer.submit(mv(0.5));
    issuer.submit(MotionIntent::Stop);
    issuer.shutdown().unwrap();
    assert_eq!(driver.intents().last(), Some(&MotionIntent::Stop));
  }
}
