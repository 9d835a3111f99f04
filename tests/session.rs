// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// tests/session.rs - 会话场景测试
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

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicUsize, Ordering},
};

use image::{GrayImage, RgbImage};
use rand::{SeedableRng, rngs::StdRng};

use moodmelody::{
  assets::{AssetLoadError, Assets},
  catalog::{Track, TrackCatalog},
  detector::{CascadeError, FaceLocalizer},
  frame::{FaceRegion, Frame},
  model::{ClassifyError, EmotionLabel, EmotionScores, FaceTensor, Model},
  pipeline::{Pipeline, PipelineError},
  session::{FeedbackError, Page, Session, SessionError, SubmissionGate},
  sink::{CsvFileSink, FeedbackRecord, FeedbackSink, SinkError},
};

const INPUT_SIZE: u32 = 16;

/// 只在帧的左上像素为白色时报告一张人脸
struct MarkerLocalizer;

impl FaceLocalizer for MarkerLocalizer {
  fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion> {
    if gray.get_pixel(0, 0)[0] > 200 {
      vec![FaceRegion::new(2, 2, 20, 20)]
    } else {
      Vec::new()
    }
  }
}

/// 依次返回预设的分类结果
struct ScriptedModel {
  script: Vec<Result<Vec<f32>, ClassifyError>>,
  calls: AtomicUsize,
}

impl ScriptedModel {
  fn new(script: Vec<Result<Vec<f32>, ClassifyError>>) -> Self {
    Self {
      script,
      calls: AtomicUsize::new(0),
    }
  }
}

impl Model for ScriptedModel {
  type Input = FaceTensor;
  type Output = EmotionScores;
  type Error = ClassifyError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    assert_eq!(input.shape(), [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3]);
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    let step = &self.script[call.min(self.script.len() - 1)];
    step.clone().map(EmotionScores::new)
  }
}

#[derive(Default)]
struct RecordingSink {
  records: Mutex<Vec<FeedbackRecord>>,
  failures_left: AtomicUsize,
}

impl RecordingSink {
  fn failing(times: usize) -> Self {
    Self {
      records: Mutex::new(Vec::new()),
      failures_left: AtomicUsize::new(times),
    }
  }

  fn records(&self) -> Vec<FeedbackRecord> {
    self.records.lock().unwrap().clone()
  }
}

impl FeedbackSink for RecordingSink {
  fn append(&self, record: &FeedbackRecord) -> Result<(), SinkError> {
    if self
      .failures_left
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok()
    {
      return Err(SinkError::Rejected {
        status: 503,
        body: "unavailable".to_string(),
      });
    }
    self.records.lock().unwrap().push(record.clone());
    Ok(())
  }
}

fn track(mood: &str, id: &str) -> Track {
  Track {
    mood: mood.to_string(),
    name: format!("Song {}", id),
    artist: format!("Artist {}", id),
    id: id.to_string(),
  }
}

fn catalog() -> TrackCatalog {
  let mut tracks = vec![
    track("Happy", "h1"),
    track("happy", "h2"),
    track("HAPPY", "h3"),
    track("Sad", "s1"),
  ];
  tracks.extend((0..15).map(|i| track("Neutral", &format!("n{}", i))));
  TrackCatalog::from_tracks(tracks)
}

fn assets(script: Vec<Result<Vec<f32>, ClassifyError>>) -> Arc<Assets> {
  let pipeline = Pipeline::new(
    Box::new(MarkerLocalizer),
    Box::new(ScriptedModel::new(script)),
    INPUT_SIZE,
  );
  Arc::new(Assets::new(Ok(pipeline), catalog()))
}

fn session_with(assets: Arc<Assets>, sink: Arc<dyn FeedbackSink + Send + Sync>) -> Session {
  Session::new(assets, sink).with_rng(StdRng::seed_from_u64(2026))
}

fn face_frame() -> Frame {
  let mut image = RgbImage::new(32, 32);
  image.put_pixel(0, 0, image::Rgb([255, 255, 255]));
  Frame::try_from_rgb(image).unwrap()
}

fn blank_frame() -> Frame {
  Frame::try_from_rgb(RgbImage::new(32, 32)).unwrap()
}

const HAPPY: [f32; 3] = [0.8, 0.1, 0.1];
const NEUTRAL: [f32; 3] = [0.1, 0.8, 0.1];
const SAD: [f32; 3] = [0.1, 0.1, 0.8];

#[test]
fn detected_emotion_drives_recommendations() {
  let mut session = session_with(
    assets(vec![Ok(HAPPY.to_vec()), Ok(SAD.to_vec())]),
    Arc::new(RecordingSink::default()),
  );

  let state = session.submit_frame(face_frame()).unwrap();
  assert_eq!(state.last_emotion(), Some(EmotionLabel::Happy));
  assert_eq!(state.recommendations().len(), 3);
  assert!(
    state
      .recommendations()
      .iter()
      .all(|t| t.matches(EmotionLabel::Happy))
  );
  let annotated = state.processed_frame().unwrap();
  assert_eq!(annotated.as_rgb().get_pixel(2, 2).0, [0, 255, 0]);

  let state = session.submit_frame(face_frame()).unwrap();
  assert_eq!(state.last_emotion(), Some(EmotionLabel::Sad));
  assert_eq!(state.recommendations().len(), 1);
}

#[test]
fn recommendation_count_is_capped() {
  let mut session = session_with(
    assets(vec![Ok(NEUTRAL.to_vec())]),
    Arc::new(RecordingSink::default()),
  );
  let state = session.submit_frame(face_frame()).unwrap();
  assert_eq!(state.recommendations().len(), 10);

  let mut session = session_with(
    assets(vec![Ok(NEUTRAL.to_vec())]),
    Arc::new(RecordingSink::default()),
  )
  .with_recommendation_count(4);
  let state = session.submit_frame(face_frame()).unwrap();
  assert_eq!(state.recommendations().len(), 4);
}

#[test]
fn no_face_clears_previous_results() {
  let mut session = session_with(
    assets(vec![Ok(HAPPY.to_vec())]),
    Arc::new(RecordingSink::default()),
  );
  session.submit_frame(face_frame()).unwrap();

  let frame = blank_frame();
  let err = session.submit_frame(frame.clone()).unwrap_err();
  assert!(matches!(
    err,
    SessionError::Pipeline(PipelineError::NoFaceDetected)
  ));
  let state = session.state();
  assert!(state.recommendations().is_empty());
  assert_eq!(state.last_emotion(), None);
  assert_eq!(state.processed_frame(), Some(&frame));
}

#[test]
fn classification_failure_is_distinct_from_no_face() {
  let mut session = session_with(
    assets(vec![Err(ClassifyError::Inference("runtime fault".into()))]),
    Arc::new(RecordingSink::default()),
  );
  let err = session.submit_frame(face_frame()).unwrap_err();
  assert!(matches!(
    err,
    SessionError::Pipeline(PipelineError::ClassificationFailed(_))
  ));
  assert!(session.state().recommendations().is_empty());
}

#[test]
fn asset_failure_disables_detection_but_not_feedback() {
  let assets = Arc::new(Assets::new(
    Err(AssetLoadError::Cascade(CascadeError::NotFound)),
    catalog(),
  ));
  let sink = Arc::new(RecordingSink::default());
  let mut session = session_with(assets, sink.clone());

  for _ in 0..2 {
    assert!(matches!(
      session.submit_frame(face_frame()),
      Err(SessionError::Pipeline(PipelineError::AssetLoad(_)))
    ));
  }
  session.navigate(Page::Feedback);
  session.submit_feedback("Ayu", Some(2), "").unwrap();
  assert_eq!(sink.records().len(), 1);
}

#[test]
fn shuffle_keeps_mood_and_size() {
  let mut session = session_with(
    assets(vec![Ok(NEUTRAL.to_vec())]),
    Arc::new(RecordingSink::default()),
  );
  session.submit_frame(face_frame()).unwrap();

  for _ in 0..5 {
    let state = session.request_shuffle();
    assert_eq!(state.last_emotion(), Some(EmotionLabel::Neutral));
    assert_eq!(state.recommendations().len(), 10);
    assert!(
      state
        .recommendations()
        .iter()
        .all(|t| t.matches(EmotionLabel::Neutral))
    );
  }
}

#[test]
fn navigation_keeps_results_and_gate() {
  let sink = Arc::new(RecordingSink::default());
  let mut session = session_with(assets(vec![Ok(SAD.to_vec())]), sink.clone());

  session.navigate(Page::Upload);
  session.submit_frame(face_frame()).unwrap();
  session.navigate(Page::Feedback);
  session.submit_feedback("Ayu", Some(0), "ok").unwrap();

  session.navigate(Page::Home);
  session.navigate(Page::Webcam);
  let state = session.navigate(Page::Feedback);
  assert_eq!(state.page(), Page::Feedback);
  assert_eq!(state.gate(), SubmissionGate::Submitted);
  assert_eq!(state.last_emotion(), Some(EmotionLabel::Sad));
  assert_eq!(state.recommendations().len(), 1);
}

#[test]
fn feedback_validation() {
  let sink = Arc::new(RecordingSink::default());
  let mut session = session_with(assets(vec![Ok(HAPPY.to_vec())]), sink.clone());

  assert!(matches!(
    session.submit_feedback("", Some(3), "nice"),
    Err(SessionError::Feedback(FeedbackError::Validation(_)))
  ));
  assert!(matches!(
    session.submit_feedback("   ", Some(3), "nice"),
    Err(SessionError::Feedback(FeedbackError::Validation(_)))
  ));
  assert!(matches!(
    session.submit_feedback("Ayu", None, "nice"),
    Err(SessionError::Feedback(FeedbackError::Validation(_)))
  ));
  assert!(sink.records().is_empty());
  assert_eq!(session.state().gate(), SubmissionGate::NotSubmitted);
}

#[test]
fn feedback_is_accepted_once_with_shifted_rating() {
  let sink = Arc::new(RecordingSink::default());
  let mut session = session_with(assets(vec![Ok(HAPPY.to_vec())]), sink.clone());

  let state = session.submit_feedback("Ayu", Some(3), "lagunya pas").unwrap();
  assert!(state.feedback_submitted());

  for rating in [Some(0), Some(4), None] {
    assert!(matches!(
      session.submit_feedback("Budi", rating, "lagi"),
      Err(SessionError::Feedback(FeedbackError::AlreadySubmitted))
    ));
  }

  let records = sink.records();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].name, "Ayu");
  assert_eq!(records[0].rating, 4);
  assert_eq!(records[0].comment, "lagunya pas");
}

#[test]
fn sink_failure_leaves_gate_open_for_retry() {
  let sink = Arc::new(RecordingSink::failing(1));
  let mut session = session_with(assets(vec![Ok(HAPPY.to_vec())]), sink.clone());

  assert!(matches!(
    session.submit_feedback("Ayu", Some(4), ""),
    Err(SessionError::Feedback(FeedbackError::SinkWrite(_)))
  ));
  assert_eq!(session.state().gate(), SubmissionGate::NotSubmitted);
  assert!(sink.records().is_empty());

  session.submit_feedback("Ayu", Some(4), "").unwrap();
  assert_eq!(session.state().gate(), SubmissionGate::Submitted);
  assert_eq!(sink.records()[0].rating, 5);
}

#[test]
fn csv_sink_receives_one_row_per_session() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("feedback.csv");
  let sink = Arc::new(CsvFileSink::new(path.clone()));

  for name in ["Ayu", "Budi"] {
    let mut session = session_with(assets(vec![Ok(HAPPY.to_vec())]), sink.clone());
    session.submit_feedback(name, Some(1), "").unwrap();
    assert!(session.submit_feedback(name, Some(1), "").is_err());
  }

  let content = std::fs::read_to_string(&path).unwrap();
  let lines: Vec<&str> = content.lines().collect();
  assert_eq!(lines.len(), 3);
  assert_eq!(lines[0], "timestamp,name,rating,comment");
  assert!(lines[1].ends_with(",Ayu,2,"));
  assert!(lines[2].ends_with(",Budi,2,"));
}
