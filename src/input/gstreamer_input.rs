// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入
//!
//! 支持两类地址：
//! - `gst://camera/dev/video0?width=1280&height=720&fps=25&format=YUY2&rotate=180`
//! - `gst://file/path/to/video.mp4?rotate=90`
//!
//! 使用前需要安装 GStreamer 开发库，并启用 `gstreamer_input` 特性。

use std::{collections::HashMap, time::Instant};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::FrameSource;
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameError, FrameSize},
};

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Invalid frame: {0}")]
  FrameError(#[from] FrameError),
}

enum PipelineItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat(String),
  VideoFlip {
    method: u32,
    direction: u32,
  },
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => format!("filesrc location={} ! decodebin", path),
      PipelineItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode, format, width, height, fps
        )
      }
      PipelineItem::TargetFormat(format) => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      PipelineItem::VideoFlip { method, direction } => {
        format!("videoflip method={} video-direction={}", method, direction)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<PipelineItem>,
}

impl GStreamerInputPipelineBuilder {
  fn camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let number = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };
    let mut items = vec![PipelineItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      format: query
        .get("format")
        .cloned()
        .unwrap_or_else(|| "RGB".to_string()),
      width: number("width", 640),
      height: number("height", 480),
      fps: number("fps", 15),
    }];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    Self { items }
  }

  fn file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![PipelineItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    Self { items }
  }

  fn video_flip(rotate: Option<&str>) -> Option<PipelineItem> {
    let (method, direction) = match rotate? {
      "90" => (1, 1),
      "180" => (2, 2),
      "270" => (3, 3),
      _ => (0, 0),
    };
    Some(PipelineItem::VideoFlip { method, direction })
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let basic_pipeline = self
      .items
      .iter()
      .map(PipelineItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 消费者跟不上时由 appsink 丢弃旧帧
    let full_pipeline = format!(
      "{} ! appsink max-buffers=1 drop=true name=sink",
      basic_pipeline
    );
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      produced: 0,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut builder = match url.host_str() {
      Some("camera") => Self::camera_pipeline(url.path(), &query),
      Some("file") => Self::file_pipeline(url.path(), &query),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };
    builder
      .items
      .push(PipelineItem::TargetFormat("RGB".to_string()));

    Ok(builder)
  }
}

/// GStreamer 视频输入
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  produced: u64,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl FrameSource for GStreamerInput {
  type Error = GStreamerInputError;

  fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
    loop {
      // 流结束时 pull_sample 返回错误
      let Ok(sample) = self.appsink.pull_sample() else {
        info!("GStreamer 输入结束");
        return Ok(None);
      };
      match convert_sample(&sample, self.produced) {
        Ok(frame) => {
          self.produced += 1;
          return Ok(Some(frame));
        }
        Err(
          e @ (GStreamerInputError::FrameError(_) | GStreamerInputError::BufferSizeMismatch { .. }),
        ) => {
          warn!("跳过无效帧: {}", e);
        }
        Err(e) => return Err(e),
      }
    }
  }
}

fn convert_sample(sample: &gst::Sample, index: u64) -> Result<Frame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  let size = FrameSize::new(video_info.width(), video_info.height())?;
  let (width, height) = (size.width() as usize, size.height() as usize);

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 行步长可能大于 width * 3
  let stride = (video_info.stride()[0] as usize).max(width * 3);
  let expected = stride * (height - 1) + width * 3;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(size.rgb_len());
  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for h in 0..height {
        let row = h * stride;
        pixels.extend_from_slice(&data[row..row + width * 3]);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for h in 0..height {
        let row = h * stride;
        for px in data[row..row + width * 3].chunks_exact(3) {
          pixels.extend_from_slice(&[px[2], px[1], px[0]]);
        }
      }
    }
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  }

  Ok(Frame::new(pixels, size, index, Instant::now())?)
}
