// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/detector.rs - 人脸定位
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

use image::GrayImage;

use crate::frame::FaceRegion;

/// 人脸定位器：在灰度帧上查找候选人脸区域
///
/// 返回顺序由具体检测器决定，流水线总是取第一个结果。
pub trait FaceLocalizer {
  fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion>;
}

/// 多尺度检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
  /// 图像金字塔相邻层的缩放步长，必须大于 1
  pub scale_factor: f32,
  /// 候选框聚类后至少需要的邻居数量
  pub min_neighbors: u32,
  /// 最小检测窗口边长（像素）
  pub min_size: u32,
}

pub const DEFAULT_SCALE_FACTOR: f32 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;
pub const DEFAULT_MIN_SIZE: u32 = 30;

impl Default for DetectorParams {
  fn default() -> Self {
    Self {
      scale_factor: DEFAULT_SCALE_FACTOR,
      min_neighbors: DEFAULT_MIN_NEIGHBORS,
      min_size: DEFAULT_MIN_SIZE,
    }
  }
}

mod haar;
pub use self::haar::{
  CascadeError, CascadeSource, DEFAULT_CASCADE_PATHS, HaarCascade, resolve_cascade_path,
};
