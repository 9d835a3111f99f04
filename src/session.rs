// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/session.rs - 会话状态机
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

use std::{fmt, str::FromStr, sync::Arc};

use rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  assets::Assets,
  frame::Frame,
  model::EmotionLabel,
  pipeline::PipelineError,
  recommend::{DEFAULT_RECOMMENDATION_COUNT, RecommendationSet, recommend},
  sink::{FeedbackRecord, FeedbackSink, SinkError},
};

/// 满意度输入的最大值（0 起始的五档评分）
pub const FEEDBACK_MAX_RATING_INPUT: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Page {
  #[default]
  Home,
  Webcam,
  Upload,
  Feedback,
}

impl Page {
  pub const ALL: [Page; 4] = [Page::Home, Page::Webcam, Page::Upload, Page::Feedback];

  pub fn as_str(&self) -> &'static str {
    match self {
      Page::Home => "home",
      Page::Webcam => "webcam",
      Page::Upload => "upload",
      Page::Feedback => "feedback",
    }
  }
}

impl fmt::Display for Page {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知页面: {0}")]
pub struct ParsePageError(String);

impl FromStr for Page {
  type Err = ParsePageError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    Self::ALL
      .into_iter()
      .find(|page| page.as_str().eq_ignore_ascii_case(s))
      .ok_or_else(|| ParsePageError(s.to_string()))
  }
}

/// 反馈提交闸门；一旦提交成功，本会话内不可重置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionGate {
  #[default]
  NotSubmitted,
  Submitted,
}

/// 单个会话的状态，只能通过 [`Session`] 的动作修改
#[derive(Debug, Clone, Default)]
pub struct SessionState {
  page: Page,
  last_emotion: Option<EmotionLabel>,
  recommendations: RecommendationSet,
  processed_frame: Option<Frame>,
  gate: SubmissionGate,
}

impl SessionState {
  pub fn page(&self) -> Page {
    self.page
  }

  pub fn last_emotion(&self) -> Option<EmotionLabel> {
    self.last_emotion
  }

  pub fn recommendations(&self) -> &RecommendationSet {
    &self.recommendations
  }

  /// 最近一次处理的帧；检测成功时带有人脸标注
  pub fn processed_frame(&self) -> Option<&Frame> {
    self.processed_frame.as_ref()
  }

  pub fn gate(&self) -> SubmissionGate {
    self.gate
  }

  pub fn feedback_submitted(&self) -> bool {
    self.gate == SubmissionGate::Submitted
  }
}

#[derive(Error, Debug)]
pub enum FeedbackError {
  #[error("反馈内容无效: {0}")]
  Validation(String),
  #[error("本次会话已提交过反馈")]
  AlreadySubmitted,
  #[error("反馈写入失败: {0}")]
  SinkWrite(#[from] SinkError),
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error(transparent)]
  Pipeline(#[from] PipelineError),
  #[error(transparent)]
  Feedback(#[from] FeedbackError),
}

pub struct Session {
  state: SessionState,
  assets: Arc<Assets>,
  sink: Arc<dyn FeedbackSink + Send + Sync>,
  rng: StdRng,
  count: usize,
}

impl Session {
  pub fn new(assets: Arc<Assets>, sink: Arc<dyn FeedbackSink + Send + Sync>) -> Self {
    Self {
      state: SessionState::default(),
      assets,
      sink,
      rng: StdRng::from_os_rng(),
      count: DEFAULT_RECOMMENDATION_COUNT,
    }
  }

  pub fn with_rng(mut self, rng: StdRng) -> Self {
    self.rng = rng;
    self
  }

  pub fn with_recommendation_count(mut self, count: usize) -> Self {
    self.count = count;
    self
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  /// 无条件切换页面，不影响检测结果与反馈闸门
  pub fn navigate(&mut self, target: Page) -> &SessionState {
    debug!("页面切换: {} -> {}", self.state.page, target);
    self.state.page = target;
    &self.state
  }

  /// 处理一帧新图像
  ///
  /// 成功时更新情绪、推荐与标注帧；任何失败都会清空情绪与推荐，
  /// 并把原始帧留作显示。
  pub fn submit_frame(&mut self, frame: Frame) -> Result<&SessionState, SessionError> {
    let assets = Arc::clone(&self.assets);
    let detection = assets.pipeline().and_then(|pipeline| pipeline.detect(&frame));

    match detection {
      Ok(detection) => {
        let recommendations = recommend(assets.catalog(), detection.label, self.count, &mut self.rng);
        info!(
          "检测到情绪 {}，推荐 {} 首曲目",
          detection.label,
          recommendations.len()
        );
        self.state.last_emotion = Some(detection.label);
        self.state.recommendations = recommendations;
        self.state.processed_frame = Some(detection.annotated);
        Ok(&self.state)
      }
      Err(e) => {
        warn!("图像处理失败: {}", e);
        self.state.last_emotion = None;
        self.state.recommendations = RecommendationSet::empty();
        self.state.processed_frame = Some(frame);
        Err(e.into())
      }
    }
  }

  /// 按当前情绪重新抽样；尚无情绪时不做任何事
  pub fn request_shuffle(&mut self) -> &SessionState {
    match self.state.last_emotion {
      Some(label) => {
        self.state.recommendations =
          recommend(self.assets.catalog(), label, self.count, &mut self.rng);
        debug!("重新推荐 {} 首 {} 曲目", self.state.recommendations.len(), label);
      }
      None => debug!("尚未检测到情绪，忽略换一批请求"),
    }
    &self.state
  }

  /// 提交反馈；`rating` 为 0 起始的满意度，写入时加一
  ///
  /// 只有写入成功后闸门才会关闭，写入失败可以重试。
  pub fn submit_feedback(
    &mut self,
    name: &str,
    rating: Option<u8>,
    comment: &str,
  ) -> Result<&SessionState, SessionError> {
    if self.state.feedback_submitted() {
      warn!("重复提交反馈被拒绝");
      return Err(FeedbackError::AlreadySubmitted.into());
    }

    let name = name.trim();
    if name.is_empty() {
      return Err(FeedbackError::Validation("请填写姓名".to_string()).into());
    }
    let rating = rating
      .ok_or_else(|| FeedbackError::Validation("请选择满意度".to_string()))?;
    if rating > FEEDBACK_MAX_RATING_INPUT {
      return Err(
        FeedbackError::Validation(format!(
          "满意度超出范围: {} (0..={})",
          rating, FEEDBACK_MAX_RATING_INPUT
        ))
        .into(),
      );
    }

    let record = FeedbackRecord::new(name, rating + 1, comment);
    self
      .sink
      .append(&record)
      .map_err(FeedbackError::SinkWrite)?;

    if self.sink.is_simulated() {
      warn!("反馈处于模拟模式，未写入任何记录");
    } else {
      info!("反馈已提交: {} ({})", record.name, record.rating);
    }
    self.state.gate = SubmissionGate::Submitted;
    Ok(&self.state)
  }
}
