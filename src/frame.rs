// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/frame.rs - 图像帧与人脸区域定义
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

use image::{GrayImage, Luma, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("图像尺寸为空: {0}x{1}")]
  Empty(u32, u32),
}

/// 人脸边界框，坐标以原始帧像素为单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
  /// 左上角 x 坐标
  pub x: u32,
  /// 左上角 y 坐标
  pub y: u32,
  /// 宽度
  pub width: u32,
  /// 高度
  pub height: u32,
}

impl FaceRegion {
  pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }


  /// 将区域裁剪到 `width` x `height` 的图像范围内，结果为空时返回 None
  pub fn clamp_to(&self, width: u32, height: u32) -> Option<FaceRegion> {
    if self.x >= width || self.y >= height {
      return None;
    }
    let w = self.width.min(width - self.x);
    let h = self.height.min(height - self.y);
    if w == 0 || h == 0 {
      return None;
    }
    Some(FaceRegion::new(self.x, self.y, w, h))
  }
}

/// 解码后的 8 位 RGB 图像帧
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  image: RgbImage,
}

impl Frame {
  /// 解码上传或摄像头拍摄的图像字节（JPEG / PNG）
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    Self::try_from_rgb(image)
  }

  pub fn try_from_rgb(image: RgbImage) -> Result<Self, FrameError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::Empty(width, height));
    }
    Ok(Self { image })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn as_rgb(&self) -> &RgbImage {
    &self.image
  }

  /// 原地修改像素；尺寸保持不变
  pub fn as_rgb_mut(&mut self) -> &mut RgbImage {
    &mut self.image
  }

  /// 灰度副本，供人脸定位与表情分类使用
  ///
  /// 按 BT.601 权重（0.299, 0.587, 0.114）换算，与级联和分类模型训练时的灰度一致。
  pub fn to_gray(&self) -> GrayImage {
    GrayImage::from_fn(self.width(), self.height(), |x, y| {
      let [r, g, b] = self.image.get_pixel(x, y).0;
      Luma([luma_bt601(r, g, b)])
    })
  }
}

// 14 位定点系数，合计 1 << 14
const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

fn luma_bt601(r: u8, g: u8, b: u8) -> u8 {
  let sum = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
  ((sum + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8
}
