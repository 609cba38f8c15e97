// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 跟踪任务
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
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use tracing::{error, info, warn};

use crate::{
  config::TrackingConfig,
  detector::Detector,
  driver::CameraDriver,
  event::TrackingEvent,
  frame::Frame,
  input::FrameSource,
  orchestrator::{Orchestrator, TrackingHandle},
  stats::StatsSnapshot,
};

/// 事件写出线程的轮询间隔
const EVENT_POLL: Duration = Duration::from_millis(200);

pub trait Task<S, D, C>: Sized {
  type Error;
  fn run_task(self, source: S, detector: D, driver: C) -> Result<StatsSnapshot, Self::Error>;
}

/// 最多交出 `limit` 帧的输入
pub struct LimitedSource<S> {
  inner: S,
  remaining: Option<usize>,
}

impl<S> LimitedSource<S> {
  pub fn new(inner: S, limit: Option<usize>) -> Self {
    Self {
      inner,
      remaining: limit,
    }
  }
}

impl<S: FrameSource> FrameSource for LimitedSource<S> {
  type Error = S::Error;

  fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    match self.remaining.as_mut() {
      Some(0) => {
        warn!("已达到指定帧数, 停止读取");
        Ok(None)
      }
      Some(remaining) => {
        *remaining -= 1;
        self.inner.next_frame()
      }
      None => self.inner.next_frame(),
    }
  }
}

/// 把事件以 JSON 行写入文件
pub fn write_events<W: Write>(writer: &mut W, events: &[TrackingEvent]) -> std::io::Result<()> {
  for event in events {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
  }
  writer.flush()
}

fn spawn_event_writer(
  path: &Path,
  handle: TrackingHandle,
  done: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
  let mut writer = BufWriter::new(File::create(path)?);
  thread::Builder::new().name("events".to_string()).spawn(move || {
    loop {
      let finished = done.load(Ordering::SeqCst);
      let events = handle.drain_events();
      if let Err(e) = write_events(&mut writer, &events) {
        error!("写入跟踪事件失败: {}", e);
        break;
      }
      if finished {
        break;
      }
      thread::sleep(EVENT_POLL);
    }
  })
}

/// 持续跟踪任务，收到 Ctrl-C 或输入结束时退出
#[derive(Default, Debug)]
pub struct TrackingTask {
  config: TrackingConfig,
  frame_number: Option<usize>,
  events: Option<PathBuf>,
}

impl TrackingTask {
  pub fn new(config: TrackingConfig) -> Self {
    Self {
      config,
      ..Self::default()
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_events(mut self, events: Option<PathBuf>) -> Self {
    self.events = events;
    self
  }
}

impl<S: FrameSource, D: Detector, C: CameraDriver> Task<S, D, C> for TrackingTask {
  type Error = anyhow::Error;

  fn run_task(self, source: S, detector: D, driver: C) -> Result<StatsSnapshot, Self::Error> {
    info!("开始任务...");
    let shutdown = Arc::new(AtomicBool::new(false));

    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      flag.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut orchestrator = Orchestrator::new(self.config)?;
    let events_done = Arc::new(AtomicBool::new(false));
    let event_writer = match &self.events {
      Some(path) => {
        info!("跟踪事件写入: {}", path.display());
        Some(spawn_event_writer(
          path,
          orchestrator.handle(),
          events_done.clone(),
        )?)
      }
      None => None,
    };

    let source = LimitedSource::new(source, self.frame_number);
    let result = orchestrator.run(source, detector, driver, shutdown);

    events_done.store(true, Ordering::SeqCst);
    if let Some(writer) = event_writer {
      if writer.join().is_err() {
        error!("事件写出线程异常退出");
      }
    }

    let stats = result?;
    info!("任务完成，退出");
    Ok(stats)
  }
}
