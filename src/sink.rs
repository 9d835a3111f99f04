// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/sink.rs - 反馈写入端
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

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub const FEEDBACK_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 一条用户反馈；交给写入端后核心不再保留
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRecord {
  pub timestamp: String,
  pub name: String,
  pub rating: u8,
  pub comment: String,
}

impl FeedbackRecord {
  /// 时间戳由服务端在构造时生成
  pub fn new(name: &str, rating: u8, comment: &str) -> Self {
    Self {
      timestamp: chrono::Local::now()
        .format(FEEDBACK_TIMESTAMP_FORMAT)
        .to_string(),
      name: name.to_string(),
      rating,
      comment: comment.to_string(),
    }
  }
}

#[derive(Error, Debug)]
pub enum SinkError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("CSV 写入错误: {0}")]
  Csv(#[from] csv::Error),
  #[cfg(feature = "sheets_sink")]
  #[error("HTTP 错误: {0}")]
  Http(#[from] reqwest::Error),
  #[error("远端拒绝写入: {status} {body}")]
  Rejected { status: u16, body: String },
  #[error("缺少凭据: 环境变量 {0} 未设置")]
  MissingCredentials(String),
  #[error("写入端地址无效: {0}")]
  InvalidUrl(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 只追加的反馈存储
pub trait FeedbackSink {
  fn append(&self, record: &FeedbackRecord) -> Result<(), SinkError>;

  /// 模拟模式下不会真正写入任何记录
  fn is_simulated(&self) -> bool {
    false
  }
}

mod csv_file;
mod simulated;
pub use self::csv_file::CsvFileSink;
pub use self::simulated::SimulatedSink;

#[cfg(feature = "sheets_sink")]
mod sheets;
#[cfg(feature = "sheets_sink")]
pub use self::sheets::SheetsSink;

pub enum SinkWrapper {
  Simulated(SimulatedSink),
  CsvFile(CsvFileSink),
  #[cfg(feature = "sheets_sink")]
  Sheets(SheetsSink),
}

impl FromUrl for SinkWrapper {
  type Error = SinkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SimulatedSink::SCHEME => Ok(SinkWrapper::Simulated(SimulatedSink)),
      CsvFileSink::SCHEME => Ok(SinkWrapper::CsvFile(CsvFileSink::from_url(url)?)),
      #[cfg(feature = "sheets_sink")]
      SheetsSink::SCHEME => match SheetsSink::from_url(url) {
        Ok(sink) => Ok(SinkWrapper::Sheets(sink)),
        Err(SinkError::MissingCredentials(var)) => {
          warn!("在线表格凭据未配置（{}），反馈仅为模拟", var);
          Ok(SinkWrapper::Simulated(SimulatedSink))
        }
        Err(e) => Err(e),
      },
      other => Err(SinkError::SchemeMismatch(other.to_string())),
    }
  }
}

impl SinkWrapper {
  /// 未配置写入端时进入模拟模式
  pub fn from_optional_url(url: Option<&Url>) -> Result<Self, SinkError> {
    match url {
      Some(url) => Self::from_url(url),
      None => {
        warn!("未配置反馈写入端，反馈仅为模拟");
        Ok(SinkWrapper::Simulated(SimulatedSink))
      }
    }
  }
}

impl FeedbackSink for SinkWrapper {
  fn append(&self, record: &FeedbackRecord) -> Result<(), SinkError> {
    match self {
      SinkWrapper::Simulated(sink) => sink.append(record),
      SinkWrapper::CsvFile(sink) => sink.append(record),
      #[cfg(feature = "sheets_sink")]
      SinkWrapper::Sheets(sink) => sink.append(record),
    }
  }

  fn is_simulated(&self) -> bool {
    match self {
      SinkWrapper::Simulated(sink) => sink.is_simulated(),
      SinkWrapper::CsvFile(sink) => sink.is_simulated(),
      #[cfg(feature = "sheets_sink")]
      SinkWrapper::Sheets(sink) => sink.is_simulated(),
    }
  }
}
