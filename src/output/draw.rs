// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/output/draw.rs - 人脸区域标注
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::frame::{FaceRegion, Frame};

const REGION_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const REGION_THICKNESS: u32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: REGION_COLOR,
      thickness: REGION_THICKNESS,
    }
  }
}

impl Draw {
  /// 在图像上原地绘制矩形边框，线宽向内扩展，超出图像的部分被裁掉
  pub fn draw_region_mut(&self, image: &mut RgbImage, region: FaceRegion) {
    let Some(region) = region.clamp_to(image.width(), image.height()) else {
      return;
    };

    for i in 0..self.thickness {
      let width = region.width.saturating_sub(2 * i);
      let height = region.height.saturating_sub(2 * i);
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at((region.x + i) as i32, (region.y + i) as i32).of_size(width, height);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  /// 返回标注后的副本，原帧保持不变
  pub fn draw_region(&self, frame: &Frame, region: FaceRegion) -> Frame {
    let mut annotated = frame.clone();
    self.draw_region_mut(annotated.as_rgb_mut(), region);
    annotated
  }
}
