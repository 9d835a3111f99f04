// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::Path;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FaceRegion, Frame},
  output::{Render, draw::Draw},
};

pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw: Draw::default(),
    })
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn save_frame(&self, frame: &Frame) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    frame.as_rgb().save(&self.path)?;
    info!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

/// 标注人脸区域后保存
impl Render<Frame, FaceRegion> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &FaceRegion) -> Result<(), Self::Error> {
    let annotated = self.draw.draw_region(frame, *result);
    self.save_frame(&annotated)
  }
}

/// 未检测到人脸时原样保存
impl Render<Frame, Option<FaceRegion>> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &Option<FaceRegion>) -> Result<(), Self::Error> {
    match result {
      Some(region) => self.render_result(frame, region),
      None => self.save_frame(frame),
    }
  }
}
