// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/sink/csv_file.rs - 本地 CSV 反馈写入端
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

use std::{fs::OpenOptions, path::PathBuf};

use tracing::info;
use url::Url;

use super::{FeedbackRecord, FeedbackSink, SinkError};
use crate::{FromUrl, FromUrlWithScheme};

const CSV_HEADER: [&str; 4] = ["timestamp", "name", "rating", "comment"];

/// 追加到本地 CSV 文件，新文件先写表头
#[derive(Debug, Clone)]
pub struct CsvFileSink {
  path: PathBuf,
}

impl CsvFileSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &std::path::Path {
    &self.path
  }
}

impl FromUrlWithScheme for CsvFileSink {
  const SCHEME: &'static str = "file";
}

impl FromUrl for CsvFileSink {
  type Error = SinkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SinkError::SchemeMismatch(url.scheme().to_string()));
    }
    let path = url
      .to_file_path()
      .map_err(|_| SinkError::InvalidUrl(url.to_string()))?;
    Ok(CsvFileSink::new(path))
  }
}

impl FeedbackSink for CsvFileSink {
  fn append(&self, record: &FeedbackRecord) -> Result<(), SinkError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    let is_new = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
      .has_headers(false)
      .from_writer(file);
    if is_new {
      writer.write_record(CSV_HEADER)?;
    }
    writer.serialize(record)?;
    writer.flush()?;

    info!("反馈已写入: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn appends_rows_after_single_header() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvFileSink::new(dir.path().join("nested/feedback.csv"));

    sink
      .append(&FeedbackRecord {
        timestamp: "2026-10-18 09:30:00".into(),
        name: "Ayu".into(),
        rating: 5,
        comment: "lagunya pas, mantap".into(),
      })
      .unwrap();
    sink
      .append(&FeedbackRecord {
        timestamp: "2026-10-18 09:31:00".into(),
        name: "Budi".into(),
        rating: 2,
        comment: String::new(),
      })
      .unwrap();

    let content = std::fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
      lines,
      vec![
        "timestamp,name,rating,comment",
        "2026-10-18 09:30:00,Ayu,5,\"lagunya pas, mantap\"",
        "2026-10-18 09:31:00,Budi,2,",
      ]
    );
  }

  #[test]
  fn file_url_maps_to_path() {
    let url = Url::parse("file:///var/lib/moodmelody/feedback.csv").unwrap();
    let sink = CsvFileSink::from_url(&url).unwrap();
    assert_eq!(sink.path(), std::path::Path::new("/var/lib/moodmelody/feedback.csv"));
  }
}
