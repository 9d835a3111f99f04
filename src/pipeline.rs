// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/pipeline.rs - 人脸定位与表情分类流水线
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  assets::AssetLoadError,
  detector::FaceLocalizer,
  frame::{FaceRegion, Frame},
  model::{ClassifyError, EmotionLabel, EmotionModel, EmotionScores, FaceTensor},
  output::draw::Draw,
};

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
  #[error("检测资源不可用: {0}")]
  AssetLoad(Arc<AssetLoadError>),
  #[error("未检测到人脸")]
  NoFaceDetected,
  #[error("表情分类失败: {0}")]
  ClassificationFailed(#[from] ClassifyError),
}

/// 一次成功检测的结果
#[derive(Debug, Clone)]
pub struct EmotionDetection {
  pub label: EmotionLabel,
  pub region: FaceRegion,
  pub scores: EmotionScores,
  /// 标注了人脸区域的帧副本
  pub annotated: Frame,
}

pub struct Pipeline {
  localizer: Box<dyn FaceLocalizer + Send + Sync>,
  model: Box<EmotionModel>,
  input_size: u32,
  draw: Draw,
}

impl Pipeline {
  pub fn new(
    localizer: Box<dyn FaceLocalizer + Send + Sync>,
    model: Box<EmotionModel>,
    input_size: u32,
  ) -> Self {
    Self {
      localizer,
      model,
      input_size,
      draw: Draw::default(),
    }
  }

  /// 在帧中定位人脸，只对第一个候选区域做表情分类
  pub fn detect(&self, frame: &Frame) -> Result<EmotionDetection, PipelineError> {
    let now = std::time::Instant::now();
    let gray = frame.to_gray();

    let faces = self.localizer.locate(&gray);
    debug!("检测到 {} 个候选人脸", faces.len());
    let Some(&region) = faces.first() else {
      warn!("未检测到人脸");
      return Err(PipelineError::NoFaceDetected);
    };
    if faces.len() > 1 {
      debug!("存在多个人脸，仅使用第一个: {:?}", region);
    }

    let annotated = self.draw.draw_region(frame, region);

    let tensor = FaceTensor::from_gray_region(&gray, region, self.input_size)?;
    let scores = self.model.infer(&tensor)?;
    let label = scores.arg_max()?;

    info!(
      "表情: {} (概率 {:?})，耗时: {:.2?}",
      label,
      scores.probabilities(),
      now.elapsed()
    );

    Ok(EmotionDetection {
      label,
      region,
      scores,
      annotated,
    })
  }
}
