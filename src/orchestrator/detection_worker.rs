// 该文件是 Shanan （山南西风） 项目的一部分。
// src/orchestrator/detection_worker.rs - 单飞的检测线程
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
  sync::mpsc::{self, Receiver, Sender},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use tracing::{debug, error, warn};

use crate::{detection::Detection, detector::Detector, frame::Frame};

struct Job {
  epoch: u64,
  frame: Frame,
}

struct JobResult {
  epoch: u64,
  frame_index: u64,
  result: Result<Vec<Detection>, String>,
  elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
  Completed {
    frame_index: u64,
    detections: Vec<Detection>,
  },
  Failed(String),
  /// 每个任务最多报告一次
  TimedOut,
  /// 超时后才返回，或属于上一轮跟踪的结果
  Discarded,
}

#[derive(Debug)]
struct InFlight {
  frame_index: u64,
  submitted_at: Instant,
  timed_out: bool,
}

/// 检测线程
///
/// 同一时刻最多一个检测任务；上一个任务（包括已超时的）没返回之前，新的提交会被跳过。
/// 任务带着提交时的 epoch，返回时 epoch 已变化的结果会被丢弃。
pub struct DetectionWorker {
  jobs: Option<Sender<Job>>,
  results: Receiver<JobResult>,
  in_flight: Option<InFlight>,
  timeout: Duration,
  thread: Option<JoinHandle<()>>,
}

impl DetectionWorker {
  pub fn spawn<D: Detector>(mut detector: D, timeout: Duration) -> std::io::Result<Self> {
    let (job_tx, job_rx) = mpsc::channel::<Job>();
    let (result_tx, result_rx) = mpsc::channel::<JobResult>();

    let thread = thread::Builder::new()
      .name("detector".to_string())
      .spawn(move || {
        while let Ok(job) = job_rx.recv() {
          let started = Instant::now();
          let result = detector.detect(&job.frame).map_err(|e| e.to_string());
          let reply = JobResult {
            epoch: job.epoch,
            frame_index: job.frame.index(),
            result,
            elapsed: started.elapsed(),
          };
          if result_tx.send(reply).is_err() {
            break;
          }
        }
        debug!("检测线程退出");
      })?;

    Ok(Self {
      jobs: Some(job_tx),
      results: result_rx,
      in_flight: None,
      timeout,
      thread: Some(thread),
    })
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight.is_some()
  }

  /// 空闲时提交一帧；忙或线程已退出时返回 `false`
  pub fn submit(&mut self, frame: Frame, epoch: u64, now: Instant) -> bool {
    if self.in_flight.is_some() {
      return false;
    }
    let Some(jobs) = &self.jobs else {
      return false;
    };

    let frame_index = frame.index();
    if jobs.send(Job { epoch, frame }).is_err() {
      error!("检测线程已退出");
      self.jobs = None;
      return false;
    }
    self.in_flight = Some(InFlight {
      frame_index,
      submitted_at: now,
      timed_out: false,
    });
    true
  }

  pub fn poll(&mut self, epoch: u64, now: Instant) -> Vec<WorkerEvent> {
    let mut events = Vec::new();

    while let Ok(reply) = self.results.try_recv() {
      let late = self.in_flight.take().map(|job| job.timed_out).unwrap_or(true);
      if late || reply.epoch != epoch {
        debug!(
          "丢弃第 {} 帧的检测结果（耗时 {:.2?}）",
          reply.frame_index, reply.elapsed
        );
        events.push(WorkerEvent::Discarded);
        continue;
      }
      match reply.result {
        Ok(detections) => events.push(WorkerEvent::Completed {
          frame_index: reply.frame_index,
          detections,
        }),
        Err(message) => {
          warn!("第 {} 帧检测失败: {}", reply.frame_index, message);
          events.push(WorkerEvent::Failed(message));
        }
      }
    }

    if let Some(job) = self.in_flight.as_mut() {
      if !job.timed_out && now.saturating_duration_since(job.submitted_at) >= self.timeout {
        job.timed_out = true;
        warn!("第 {} 帧检测超时 ({:.2?})", job.frame_index, self.timeout);
        events.push(WorkerEvent::TimedOut);
      }
    }

    events
  }

  pub fn shutdown(mut self) {
    self.jobs = None;
    if let Some(thread) = self.thread.take() {
      if self.in_flight.is_some() {
        warn!("检测仍在进行，不再等待检测线程");
      } else if thread.join().is_err() {
        error!("检测线程异常退出");
      }
    }
  }
}
