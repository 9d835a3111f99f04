// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/recommend.rs - 按情绪抽样推荐曲目
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

use rand::{Rng, seq::SliceRandom};
use tracing::debug;

use crate::{
  catalog::{Track, TrackCatalog},
  model::EmotionLabel,
};

pub const DEFAULT_RECOMMENDATION_COUNT: usize = 10;

/// 一次抽样得到的推荐集合，所有曲目的情绪标签相同
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationSet {
  mood: Option<EmotionLabel>,
  tracks: Vec<Track>,
}

impl RecommendationSet {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn mood(&self) -> Option<EmotionLabel> {
    self.mood
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

  pub fn iter(&self) -> std::slice::Iter<'_, Track> {
    self.tracks.iter()
  }
}

/// 从目录中筛选与 `label` 匹配的曲目，无放回地均匀抽取 min(count, 匹配数) 首
///
/// 每次调用相互独立，不记忆之前的结果，重复调用可能再次给出相同曲目。
pub fn recommend<R: Rng + ?Sized>(
  catalog: &TrackCatalog,
  label: EmotionLabel,
  count: usize,
  rng: &mut R,
) -> RecommendationSet {
  let mut matching: Vec<&Track> = catalog.matching(label).collect();
  let total = matching.len();
  if total == 0 {
    debug!("情绪 {} 没有匹配的曲目", label);
    return RecommendationSet::empty();
  }

  let (sampled, _) = matching.partial_shuffle(rng, count.min(total));
  debug!("情绪 {}: 从 {} 首中抽取 {} 首", label, total, sampled.len());

  RecommendationSet {
    mood: Some(label),
    tracks: sampled.iter().map(|&t| t.clone()).collect(),
  }
}
