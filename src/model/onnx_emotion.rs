// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/model/onnx_emotion.rs - ONNX 表情分类模型
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

use std::{path::Path, sync::Mutex};

use ort::{session::Session, value::Tensor};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{ClassifyError, EMOTION_NUM_CLASSES, EmotionScores, FaceTensor, Model},
};

const EMOTION_NUM_INPUTS: usize = 1;
const EMOTION_DEFAULT_INPUT_SIZE: u32 = 224;
const EMOTION_DEFAULT_INTRA_THREADS: usize = 1;

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型文件不存在: {0}")]
  NotFound(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

pub struct OnnxEmotionBuilder {
  model_path: String,
  input_size: u32,
  intra_threads: usize,
}

impl FromUrlWithScheme for OnnxEmotionBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxEmotionBuilder {
  type Error = OnnxModelError;

  /// `onnx:///path/model.onnx?size=224&threads=1`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = OnnxEmotionBuilder {
      model_path: url.path().to_string(),
      input_size: EMOTION_DEFAULT_INPUT_SIZE,
      intra_threads: EMOTION_DEFAULT_INTRA_THREADS,
    };

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => {
          builder.input_size = value
            .parse()
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| OnnxModelError::ModelPathError(format!("输入尺寸无效: {}", value)))?;
        }
        "threads" => {
          builder.intra_threads = value
            .parse()
            .ok()
            .filter(|&t| t > 0)
            .ok_or_else(|| OnnxModelError::ModelPathError(format!("线程数无效: {}", value)))?;
        }
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl OnnxEmotionBuilder {
  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn build(self) -> Result<OnnxEmotionModel, OnnxModelError> {
    let path = Path::new(&self.model_path);
    if !path.exists() {
      error!("模型文件不存在: {}", self.model_path);
      return Err(OnnxModelError::NotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path);
    let size = std::fs::metadata(path)?.len();
    debug!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));

    let session = Session::builder()?
      .with_intra_threads(self.intra_threads)?
      .commit_from_file(path)?;

    if session.inputs.len() != EMOTION_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        EMOTION_NUM_INPUTS,
        session.inputs.len()
      );
      return Err(OnnxModelError::ModelInvalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        EMOTION_NUM_INPUTS,
        session.inputs.len()
      )));
    }
    if session.outputs.is_empty() {
      return Err(OnnxModelError::ModelInvalid("模型没有输出".to_string()));
    }

    let input_name = session.inputs[0].name.clone();
    debug!("模型输入名称: {}", input_name);
    debug!("模型输出数量: {}", session.outputs.len());
    info!("模型加载完成");

    Ok(OnnxEmotionModel {
      session: Mutex::new(session),
      input_name,
      input_size: self.input_size,
    })
  }
}

/// 加载后只读共享；会话运行需要独占访问，因此以互斥锁包装
pub struct OnnxEmotionModel {
  session: Mutex<Session>,
  input_name: String,
  input_size: u32,
}

impl Model for OnnxEmotionModel {
  type Input = FaceTensor;
  type Output = EmotionScores;
  type Error = ClassifyError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.size() != self.input_size {
      return Err(ClassifyError::InputSize {
        expected: self.input_size,
        actual: input.size(),
      });
    }

    debug!("设置模型输入");
    let tensor = Tensor::from_array((input.shape(), input.as_nhwc().to_vec().into_boxed_slice()))
      .map_err(|e| ClassifyError::Inference(e.to_string()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| ClassifyError::Inference("模型会话锁已损坏".to_string()))?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(|e| ClassifyError::Inference(e.to_string()))?;

    let (_, value) = outputs
      .iter()
      .next()
      .ok_or_else(|| ClassifyError::Inference("模型没有产生输出".to_string()))?;
    let (_shape, data) = value
      .try_extract_tensor::<f32>()
      .map_err(|e| ClassifyError::Inference(e.to_string()))?;

    if data.len() != EMOTION_NUM_CLASSES {
      return Err(ClassifyError::OutputShape {
        expected: EMOTION_NUM_CLASSES,
        actual: data.len(),
      });
    }

    debug!("模型推理结果: {:?}", data);
    Ok(EmotionScores::new(data.to_vec()))
  }
}
