// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/config.rs - 资源参数配置
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

use clap::Args;
use url::Url;

use crate::{
  detector::{DEFAULT_MIN_NEIGHBORS, DEFAULT_MIN_SIZE, DEFAULT_SCALE_FACTOR, DetectorParams},
  recommend::DEFAULT_RECOMMENDATION_COUNT,
};

/// 各个驱动程序共用的资源参数
#[derive(Args, Debug, Clone)]
pub struct AssetArgs {
  /// 表情分类模型路径，例如 onnx:///models/emotion.onnx?size=224
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 人脸检测级联文件（OpenCV XML）
  /// 不存在时回退到系统自带的默认文件
  #[arg(long, value_name = "FILE")]
  pub cascade: Option<PathBuf>,

  /// 曲目目录（.csv 或 .xlsx 等工作簿），至少包含 mood,name,artist,id 四列
  #[arg(long, value_name = "FILE", default_value = "data_moods.csv")]
  pub catalog: PathBuf,

  /// 反馈写入端
  /// 支持:
  /// - 文件: file:///path/feedback.csv
  /// - 在线表格: sheets://<表格标识>/<范围>?token_env=VAR
  /// - 模拟: simulate:
  /// 未指定时仅模拟写入
  #[arg(long, value_name = "SINK")]
  pub feedback: Option<Url>,

  /// 候选框聚类所需的最少邻居数
  #[arg(long, default_value_t = DEFAULT_MIN_NEIGHBORS, value_name = "COUNT")]
  pub min_neighbors: u32,

  /// 最小人脸边长（像素）
  #[arg(long, default_value_t = DEFAULT_MIN_SIZE, value_name = "PIXELS")]
  pub min_size: u32,

  /// 图像金字塔缩放步长（大于 1）
  #[arg(long, default_value_t = DEFAULT_SCALE_FACTOR, value_name = "FACTOR")]
  pub scale_factor: f32,

  /// 每次推荐的曲目数量
  #[arg(long, default_value_t = DEFAULT_RECOMMENDATION_COUNT, value_name = "COUNT")]
  pub count: usize,
}

impl AssetArgs {
  pub fn detector_params(&self) -> DetectorParams {
    DetectorParams {
      scale_factor: self.scale_factor,
      min_neighbors: self.min_neighbors,
      min_size: self.min_size,
    }
  }
}
