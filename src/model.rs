// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/model.rs - 表情分类模型
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

use std::{fmt, str::FromStr};

use image::{GrayImage, imageops::FilterType};
use thiserror::Error;

use crate::frame::FaceRegion;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 流水线使用的表情分类模型
pub type EmotionModel =
  dyn Model<Input = FaceTensor, Output = EmotionScores, Error = ClassifyError> + Send + Sync;

/// 表情标签，声明顺序即模型输出的类别顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmotionLabel {
  Happy,
  Neutral,
  Sad,
}

pub const EMOTION_NUM_CLASSES: usize = 3;

impl EmotionLabel {
  pub const ALL: [EmotionLabel; EMOTION_NUM_CLASSES] =
    [EmotionLabel::Happy, EmotionLabel::Neutral, EmotionLabel::Sad];

  pub fn as_str(&self) -> &'static str {
    match self {
      EmotionLabel::Happy => "Happy",
      EmotionLabel::Neutral => "Neutral",
      EmotionLabel::Sad => "Sad",
    }
  }

  pub fn from_label_id(id: usize) -> Option<Self> {
    Self::ALL.get(id).copied()
  }

  pub fn to_label_id(&self) -> usize {
    *self as usize
  }

  /// 曲目的情绪标签按大小写不敏感方式匹配
  pub fn matches_mood(&self, mood: &str) -> bool {
    mood.trim().eq_ignore_ascii_case(self.as_str())
  }
}

impl fmt::Display for EmotionLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EmotionLabel {
  type Err = ClassifyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|label| label.matches_mood(s))
      .ok_or_else(|| ClassifyError::UnknownLabel(s.to_string()))
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
  #[error("人脸区域无效: {0:?}")]
  InvalidRegion(FaceRegion),
  #[error("模型输入尺寸不匹配: 期望 {expected}, 实际 {actual}")]
  InputSize { expected: u32, actual: u32 },
  #[error("模型输出类别数不匹配: 期望 {expected}, 实际 {actual}")]
  OutputShape { expected: usize, actual: usize },
  #[error("模型输出包含非有限值")]
  NonFinite,
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("未知表情标签: {0}")]
  UnknownLabel(String),
}

/// 模型输入：NHWC 排列的 [1, S, S, 3] 张量，数值归一化到 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTensor {
  size: u32,
  data: Box<[f32]>,
}

const RGB_CHANNELS: usize = 3;

impl FaceTensor {
  /// 从灰度帧裁剪人脸区域，缩放到 `size` x `size`，复制为三通道并归一化
  pub fn from_gray_region(
    gray: &GrayImage,
    region: FaceRegion,
    size: u32,
  ) -> Result<Self, ClassifyError> {
    let region = region
      .clamp_to(gray.width(), gray.height())
      .ok_or(ClassifyError::InvalidRegion(region))?;
    if size == 0 {
      return Err(ClassifyError::InvalidRegion(region));
    }

    let crop =
      image::imageops::crop_imm(gray, region.x, region.y, region.width, region.height).to_image();
    let resized = image::imageops::resize(&crop, size, size, FilterType::Triangle);

    let mut data = Vec::with_capacity(size as usize * size as usize * RGB_CHANNELS);
    for pixel in resized.pixels() {
      let v = pixel[0] as f32 / 255.0;
      data.extend_from_slice(&[v; RGB_CHANNELS]);
    }

    Ok(Self {
      size,
      data: data.into_boxed_slice(),
    })
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.size as usize, self.size as usize, RGB_CHANNELS]
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }
}

/// 模型输出的各类别概率
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionScores {
  probabilities: Vec<f32>,
}

impl EmotionScores {
  pub fn new(probabilities: Vec<f32>) -> Self {
    Self { probabilities }
  }

  pub fn probabilities(&self) -> &[f32] {
    &self.probabilities
  }

  /// 取概率最大的标签；并列时取索引最小者
  pub fn arg_max(&self) -> Result<EmotionLabel, ClassifyError> {
    if self.probabilities.len() != EMOTION_NUM_CLASSES {
      return Err(ClassifyError::OutputShape {
        expected: EMOTION_NUM_CLASSES,
        actual: self.probabilities.len(),
      });
    }
    if self.probabilities.iter().any(|p| !p.is_finite()) {
      return Err(ClassifyError::NonFinite);
    }

    let mut best = 0usize;
    for (idx, &p) in self.probabilities.iter().enumerate().skip(1) {
      if p > self.probabilities[best] {
        best = idx;
      }
    }
    EmotionLabel::from_label_id(best).ok_or(ClassifyError::OutputShape {
      expected: EMOTION_NUM_CLASSES,
      actual: best + 1,
    })
  }
}

mod onnx_emotion;
pub use self::onnx_emotion::{OnnxEmotionBuilder, OnnxEmotionModel, OnnxModelError};

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  #[test]
  fn arg_max_picks_largest() {
    let scores = EmotionScores::new(vec![0.1, 0.2, 0.7]);
    assert_eq!(scores.arg_max().unwrap(), EmotionLabel::Sad);
  }

  #[test]
  fn arg_max_tie_resolves_to_lowest_index() {
    let scores = EmotionScores::new(vec![0.4, 0.4, 0.2]);
    assert_eq!(scores.arg_max().unwrap(), EmotionLabel::Happy);

    let scores = EmotionScores::new(vec![0.1, 0.45, 0.45]);
    assert_eq!(scores.arg_max().unwrap(), EmotionLabel::Neutral);

    let scores = EmotionScores::new(vec![0.3, 0.3, 0.3]);
    assert_eq!(scores.arg_max().unwrap(), EmotionLabel::Happy);
  }

  #[test]
  fn arg_max_rejects_wrong_class_count() {
    let err = EmotionScores::new(vec![0.5, 0.5]).arg_max().unwrap_err();
    assert_eq!(
      err,
      ClassifyError::OutputShape {
        expected: 3,
        actual: 2
      }
    );
  }

  #[test]
  fn arg_max_rejects_nan() {
    let err = EmotionScores::new(vec![f32::NAN, 0.5, 0.1])
      .arg_max()
      .unwrap_err();
    assert_eq!(err, ClassifyError::NonFinite);
  }

  #[test]
  fn labels_parse_case_insensitively() {
    assert_eq!("happy".parse::<EmotionLabel>().unwrap(), EmotionLabel::Happy);
    assert_eq!(" SAD ".parse::<EmotionLabel>().unwrap(), EmotionLabel::Sad);
    assert!("angry".parse::<EmotionLabel>().is_err());
    assert_eq!(EmotionLabel::Neutral.to_label_id(), 1);
  }

  #[test]
  fn face_tensor_is_normalized_nhwc() {
    let gray = GrayImage::from_fn(40, 40, |x, _| if x < 20 { Luma([255]) } else { Luma([0]) });
    let tensor = FaceTensor::from_gray_region(&gray, FaceRegion::new(0, 0, 10, 10), 8).unwrap();
    assert_eq!(tensor.shape(), [1, 8, 8, 3]);
    assert_eq!(tensor.as_nhwc().len(), 8 * 8 * 3);
    assert!(tensor.as_nhwc().iter().all(|&v| (v - 1.0).abs() < 1e-6));

    let tensor = FaceTensor::from_gray_region(&gray, FaceRegion::new(25, 5, 10, 10), 4).unwrap();
    assert!(tensor.as_nhwc().iter().all(|&v| v.abs() < 1e-6));
  }

  #[test]
  fn face_tensor_rejects_region_outside_image() {
    let gray = GrayImage::new(10, 10);
    let region = FaceRegion::new(12, 0, 4, 4);
    let err = FaceTensor::from_gray_region(&gray, region, 8).unwrap_err();
    assert_eq!(err, ClassifyError::InvalidRegion(region));
  }
}
