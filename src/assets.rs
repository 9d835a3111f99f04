// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/assets.rs - 进程级共享资源
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

use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  FromUrl,
  catalog::{CatalogError, TrackCatalog},
  config::AssetArgs,
  detector::{CascadeError, HaarCascade, resolve_cascade_path},
  model::{OnnxEmotionBuilder, OnnxModelError},
  pipeline::{Pipeline, PipelineError},
};

#[derive(Error, Debug)]
pub enum AssetLoadError {
  #[error("表情模型加载失败: {0}")]
  Model(#[from] OnnxModelError),
  #[error("人脸级联加载失败: {0}")]
  Cascade(#[from] CascadeError),
}

/// 启动时加载一次的只读资源
///
/// 检测资源加载失败只会禁用检测功能，失败原因会被保留并返回给之后的每次调用。
pub struct Assets {
  pipeline: Result<Pipeline, Arc<AssetLoadError>>,
  catalog: TrackCatalog,
  diagnostics: Vec<String>,
}

static SHARED_ASSETS: OnceLock<Arc<Assets>> = OnceLock::new();

impl Assets {
  pub fn new(pipeline: Result<Pipeline, AssetLoadError>, catalog: TrackCatalog) -> Self {
    let mut diagnostics = Vec::new();
    let pipeline = pipeline.map_err(|e| {
      error!("检测功能已禁用: {}", e);
      diagnostics.push(format!("检测功能已禁用: {}", e));
      Arc::new(e)
    });
    if catalog.is_empty() {
      diagnostics.push("曲目目录为空，将不会给出推荐".to_string());
    }

    Self {
      pipeline,
      catalog,
      diagnostics,
    }
  }

  pub fn load(args: &AssetArgs) -> Self {
    let mut diagnostics = Vec::new();

    let pipeline = load_pipeline(args, &mut diagnostics);
    let catalog = match TrackCatalog::load(&args.catalog) {
      Ok(catalog) => catalog,
      Err(e @ CatalogError::NotFound(_)) => {
        warn!("{}，使用空目录", e);
        diagnostics.push(format!("{}，使用空目录", e));
        TrackCatalog::default()
      }
      Err(e) => {
        error!("曲目目录加载失败: {}", e);
        diagnostics.push(format!("曲目目录加载失败: {}", e));
        TrackCatalog::default()
      }
    };

    let mut assets = Self::new(pipeline, catalog);
    diagnostics.append(&mut assets.diagnostics);
    assets.diagnostics = diagnostics;
    assets
  }

  /// 进程内只初始化一次，之后的调用忽略参数并返回同一份资源
  pub fn shared(args: &AssetArgs) -> Arc<Assets> {
    SHARED_ASSETS
      .get_or_init(|| Arc::new(Self::load(args)))
      .clone()
  }

  pub fn pipeline(&self) -> Result<&Pipeline, PipelineError> {
    self
      .pipeline
      .as_ref()
      .map_err(|e| PipelineError::AssetLoad(e.clone()))
  }

  pub fn catalog(&self) -> &TrackCatalog {
    &self.catalog
  }

  pub fn diagnostics(&self) -> &[String] {
    &self.diagnostics
  }
}

fn load_pipeline(
  args: &AssetArgs,
  diagnostics: &mut Vec<String>,
) -> Result<Pipeline, AssetLoadError> {
  let source = resolve_cascade_path(args.cascade.as_deref())?;
  if source.is_fallback() {
    diagnostics.push(format!(
      "使用内置默认人脸级联文件: {}",
      source.path().display()
    ));
  }
  info!("加载人脸级联文件: {}", source.path().display());
  let cascade = HaarCascade::from_file(source.path(), args.detector_params())?;

  let builder = OnnxEmotionBuilder::from_url(&args.model)?;
  let input_size = builder.input_size();
  let model = builder.build()?;

  Ok(Pipeline::new(Box::new(cascade), Box::new(model), input_size))
}
