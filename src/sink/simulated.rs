// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/sink/simulated.rs - 模拟反馈写入端
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

use tracing::warn;
use url::Url;

use super::{FeedbackRecord, FeedbackSink, SinkError};
use crate::{FromUrl, FromUrlWithScheme};

/// 凭据缺失时使用：提交照常成功，但不写入任何记录
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedSink;

impl FromUrlWithScheme for SimulatedSink {
  const SCHEME: &'static str = "simulate";
}

impl FromUrl for SimulatedSink {
  type Error = SinkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SinkError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(SimulatedSink)
  }
}

impl FeedbackSink for SimulatedSink {
  fn append(&self, record: &FeedbackRecord) -> Result<(), SinkError> {
    warn!(
      "反馈写入端未配置, 仅模拟提交: {} 评分 {}",
      record.name, record.rating
    );
    Ok(())
  }

  fn is_simulated(&self) -> bool {
    true
  }
}
