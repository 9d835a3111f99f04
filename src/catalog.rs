// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/catalog.rs - 曲目目录
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

use std::{io::Read, path::Path, sync::Arc};

use calamine::{Data, Reader, open_workbook_auto};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::EmotionLabel;

const SPOTIFY_EMBED_BASE: &str = "https://open.spotify.com/embed/track";
const REQUIRED_COLUMNS: [&str; 4] = ["mood", "name", "artist", "id"];
const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("曲目目录文件不存在: {0}")]
  NotFound(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("曲目目录格式错误: {0}")]
  Csv(#[from] csv::Error),
  #[error("工作簿读取错误: {0}")]
  Workbook(#[from] calamine::Error),
  #[error("工作簿中没有工作表")]
  EmptyWorkbook,
  #[error("曲目目录缺少列: {0}")]
  MissingColumn(&'static str),
}

/// 目录中的一首曲目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
  /// 情绪标签
  pub mood: String,
  /// 曲名
  pub name: String,
  /// 艺术家
  pub artist: String,
  /// 流媒体平台的曲目标识
  pub id: String,
}

impl Track {
  pub fn matches(&self, label: EmotionLabel) -> bool {
    label.matches_mood(&self.mood)
  }

  /// 外部嵌入式播放器地址
  pub fn embed_url(&self) -> String {
    format!(
      "{}/{}?utm_source=generator",
      SPOTIFY_EMBED_BASE,
      urlencoding::encode(&self.id)
    )
  }
}

/// 启动时加载一次、之后只读的曲目表
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
  tracks: Arc<[Track]>,
}

impl TrackCatalog {
  pub fn from_tracks(tracks: Vec<Track>) -> Self {
    Self {
      tracks: tracks.into(),
    }
  }

  /// 读取至少包含 `mood,name,artist,id` 列的表格，多余列被忽略，缺列的行被跳过
  pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .flexible(true)
      .from_reader(reader);

    let mut tracks = Vec::new();
    for (row, record) in reader.deserialize::<Track>().enumerate() {
      match record {
        Ok(track) => tracks.push(track),
        Err(e) if e.is_io_error() => return Err(e.into()),
        Err(e) => warn!("跳过第 {} 行曲目: {}", row + 2, e),
      }
    }

    Ok(Self::from_tracks(tracks))
  }

  /// 读取工作簿的第一张工作表，首行为表头，按列名（大小写不敏感）取 `mood,name,artist,id`
  pub fn from_workbook(path: &Path) -> Result<Self, CatalogError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
      .worksheet_range_at(0)
      .ok_or(CatalogError::EmptyWorkbook)??;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
      return Ok(Self::default());
    };
    let header: Vec<String> = header.iter().map(cell_text).collect();
    let mut columns = [0usize; 4];
    for (slot, column) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
      *slot = header
        .iter()
        .position(|h| h.eq_ignore_ascii_case(column))
        .ok_or(CatalogError::MissingColumn(column))?;
    }

    let mut tracks = Vec::new();
    for (row, cells) in rows.enumerate() {
      let [mood, name, artist, id] =
        columns.map(|c| cells.get(c).map(cell_text).unwrap_or_default());
      if mood.is_empty() || id.is_empty() {
        warn!("跳过第 {} 行曲目: 缺少 mood 或 id", row + 2);
        continue;
      }
      tracks.push(Track {
        mood,
        name,
        artist,
        id,
      });
    }

    Ok(Self::from_tracks(tracks))
  }

  /// 按扩展名选择格式：工作簿（xlsx 等）或 CSV
  pub fn load(path: &Path) -> Result<Self, CatalogError> {
    if !path.exists() {
      return Err(CatalogError::NotFound(path.display().to_string()));
    }

    info!("加载曲目目录: {}", path.display());
    let catalog = if is_workbook(path) {
      Self::from_workbook(path)?
    } else {
      Self::from_reader(std::fs::File::open(path)?)?
    };
    info!("曲目目录加载完成, 共 {} 首", catalog.len());
    for label in EmotionLabel::ALL {
      debug!("情绪 {}: {} 首", label, catalog.matching(label).count());
    }
    Ok(catalog)
  }

  pub fn tracks(&self) -> &[Track] {
    &self.tracks
  }

  pub fn len(&self) -> usize {
    self.tracks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tracks.is_empty()
  }

  pub fn matching(&self, label: EmotionLabel) -> impl Iterator<Item = &Track> {
    self.tracks.iter().filter(move |t| t.matches(label))
  }
}

fn is_workbook(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| {
      WORKBOOK_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
    })
}

fn cell_text(cell: &Data) -> String {
  match cell {
    Data::Empty => String::new(),
    other => other.to_string().trim().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = "\
name,album,artist,id,release_date,mood
Walking on Sunshine,Walking on Sunshine,Katrina,05wIrZSwuaVWhcv5FfqeH0,1985,Happy
Someone Like You,21,Adele,4kflIGfjdZJW4ot2ioixTB,2011,sad
Weightless,Weightless,Marconi Union,6kkwzB6hXLIONkEk9JciA6,2011, HAPPY
Clocks,A Rush of Blood,Coldplay,0BCPKOYdS2jbQ8iyB56Zns
";

  #[test]
  fn reads_required_columns_and_ignores_extras() {
    let catalog = TrackCatalog::from_reader(SAMPLE.as_bytes()).unwrap();
    assert_eq!(catalog.len(), 3);
    let first = &catalog.tracks()[0];
    assert_eq!(first.name, "Walking on Sunshine");
    assert_eq!(first.artist, "Katrina");
    assert_eq!(first.id, "05wIrZSwuaVWhcv5FfqeH0");
    assert_eq!(first.mood, "Happy");
  }

  #[test]
  fn matching_is_case_insensitive() {
    let catalog = TrackCatalog::from_reader(SAMPLE.as_bytes()).unwrap();
    assert_eq!(catalog.matching(EmotionLabel::Happy).count(), 2);
    assert_eq!(catalog.matching(EmotionLabel::Sad).count(), 1);
    assert_eq!(catalog.matching(EmotionLabel::Neutral).count(), 0);
  }

  #[test]
  fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = TrackCatalog::load(&dir.path().join("data_moods.csv")).unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
  }

  #[test]
  fn loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_moods.csv");
    std::fs::write(&path, SAMPLE).unwrap();
    let catalog = TrackCatalog::load(&path).unwrap();
    assert_eq!(catalog.len(), 3);
  }

  fn write_workbook(path: &Path, rows: &[&[&str]]) {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
      for (c, value) in row.iter().enumerate() {
        if !value.is_empty() {
          sheet.write_string(r as u32, c as u16, *value).unwrap();
        }
      }
    }
    workbook.save(path).unwrap();
  }

  #[test]
  fn loads_workbook_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_moods3.xlsx");
    write_workbook(
      &path,
      &[
        &["Name", "Album", "Artist", "ID", "Mood"],
        &["Walking on Sunshine", "Walking on Sunshine", "Katrina", "05wIrZSwuaVWhcv5FfqeH0", "Happy"],
        &["Someone Like You", "21", "Adele", "4kflIGfjdZJW4ot2ioixTB", " sad "],
        &["Clocks", "A Rush of Blood", "Coldplay", "0BCPKOYdS2jbQ8iyB56Zns", ""],
      ],
    );

    let catalog = TrackCatalog::load(&path).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.tracks()[0].artist, "Katrina");
    assert_eq!(catalog.tracks()[0].id, "05wIrZSwuaVWhcv5FfqeH0");
    assert_eq!(catalog.matching(EmotionLabel::Sad).count(), 1);
  }

  #[test]
  fn workbook_without_mood_column_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("moods.xlsx");
    write_workbook(&path, &[&["name", "artist", "id"], &["A", "B", "x1"]]);

    let err = TrackCatalog::load(&path).unwrap_err();
    assert!(matches!(err, CatalogError::MissingColumn("mood")));
  }

  #[test]
  fn embed_url_uses_track_id() {
    let track = Track {
      mood: "Happy".into(),
      name: "x".into(),
      artist: "y".into(),
      id: "05wIrZSwuaVWhcv5FfqeH0".into(),
    };
    assert_eq!(
      track.embed_url(),
      "https://open.spotify.com/embed/track/05wIrZSwuaVWhcv5FfqeH0?utm_source=generator"
    );
  }
}
