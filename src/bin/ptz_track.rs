// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/ptz_track.rs - 云台跟踪主程序
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shanan_ptz::{
  FromUrl,
  classifier::Layout,
  config::TrackingConfig,
  detector::DetectorWrapper,
  driver::DriverWrapper,
  input::InputWrapper,
  task::{Task, TrackingTask},
};

/// 云台跟踪参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 配置文件，不存在时使用默认配置
  #[arg(long, value_name = "CONFIG")]
  pub config: Option<PathBuf>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 检测器
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 云台驱动
  #[arg(long, value_name = "CAMERA")]
  pub camera: Url,
  /// 启动时开始跟踪所用的布局，覆盖配置文件
  #[arg(long, value_name = "LAYOUT")]
  pub layout: Option<Layout>,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 跟踪事件输出文件（JSON 行）
  #[arg(long, value_name = "EVENTS")]
  pub events: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackingConfig> {
  match path {
    Some(path) if path.exists() => {
      info!("配置文件: {}", path.display());
      Ok(TrackingConfig::from_json_file(path)?)
    }
    Some(path) => {
      warn!("配置文件 {} 不存在，使用默认配置", path.display());
      Ok(TrackingConfig::default())
    }
    None => Ok(TrackingConfig::default()),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("检测器: {}", args.detector);
  info!("云台驱动: {}", args.camera);

  let mut config = load_config(args.config.as_ref())?;
  if let Some(layout) = args.layout {
    config.mode.layout = layout;
    config.mode.auto_start = true;
  }
  info!(
    "跟踪布局: {}, 自动开始: {}",
    config.mode.layout, config.mode.auto_start
  );

  let input = InputWrapper::from_url(&args.input)?;
  let detector = DetectorWrapper::from_url(&args.detector)?;
  let driver = DriverWrapper::from_url(&args.camera)?;

  let stats = TrackingTask::new(config)
    .with_frame_number(args.frame_number)
    .with_events(args.events)
    .run_task(input, detector, driver)?;

  info!("运行统计: {}", serde_json::to_string(&stats)?);
  Ok(())
}
