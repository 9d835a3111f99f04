// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/detector/haar.rs - Haar 级联人脸检测器
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

use std::{
  borrow::Cow,
  path::{Path, PathBuf},
};

use image::{GrayImage, imageops::FilterType};
use quick_xml::{Reader, events::Event};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{DetectorParams, FaceLocalizer};
use crate::frame::FaceRegion;

/// 未指定或找不到本地级联文件时依次尝试的 OpenCV 数据目录
pub const DEFAULT_CASCADE_PATHS: &[&str] = &[
  "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
  "/usr/local/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
  "/usr/share/opencv/haarcascades/haarcascade_frontalface_default.xml",
  "/usr/local/share/opencv/haarcascades/haarcascade_frontalface_default.xml",
];

// 候选框聚类的相似度容差
const GROUP_EPS: f64 = 0.2;
const MIN_WINDOW_STDDEV: f64 = 10.0;
const STAGE_THRESHOLD_EPS: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum CascadeError {
  #[error("找不到人脸级联定义文件")]
  NotFound,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("XML 解析错误: {0}")]
  Xml(String),
  #[error("级联定义无效: {0}")]
  Invalid(String),
  #[error("不支持的级联定义: {0}")]
  Unsupported(String),
  #[error("检测参数无效: {0}")]
  InvalidParams(String),
}

impl CascadeError {
  fn invalid(msg: impl Into<String>) -> Self {
    CascadeError::Invalid(msg.into())
  }
}

/// 级联定义的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeSource {
  /// 用户配置的本地文件
  Configured(PathBuf),
  /// 回退到的内置默认定义
  Bundled(PathBuf),
}

impl CascadeSource {
  pub fn path(&self) -> &Path {
    match self {
      CascadeSource::Configured(path) | CascadeSource::Bundled(path) => path,
    }
  }

  pub fn is_fallback(&self) -> bool {
    matches!(self, CascadeSource::Bundled(_))
  }
}

/// 确定级联定义文件：优先使用配置路径，否则回退到内置默认定义并给出警告
pub fn resolve_cascade_path(configured: Option<&Path>) -> Result<CascadeSource, CascadeError> {
  resolve_with_defaults(configured, DEFAULT_CASCADE_PATHS)
}

fn resolve_with_defaults(
  configured: Option<&Path>,
  defaults: &[&str],
) -> Result<CascadeSource, CascadeError> {
  if let Some(path) = configured
    && path.exists()
  {
    return Ok(CascadeSource::Configured(path.to_path_buf()));
  }

  match configured {
    Some(path) => warn!(
      "本地人脸级联文件不存在: {}，使用内置默认定义",
      path.display()
    ),
    None => warn!("未指定人脸级联文件，使用内置默认定义"),
  }

  defaults
    .iter()
    .map(PathBuf::from)
    .find(|path| path.exists())
    .map(CascadeSource::Bundled)
    .ok_or(CascadeError::NotFound)
}

#[derive(Debug, Clone, Copy)]
struct HaarRect {
  x: u32,
  y: u32,
  width: u32,
  height: u32,
  weight: f32,
}

#[derive(Debug, Clone, Default)]
struct HaarFeature {
  rects: Vec<HaarRect>,
}

impl HaarFeature {
  fn eval(&self, integral: &IntegralImage, wx: u32, wy: u32) -> f64 {
    self
      .rects
      .iter()
      .map(|r| r.weight as f64 * integral.rect_sum(wx + r.x, wy + r.y, r.width, r.height) as f64)
      .sum()
  }
}

/// 决策树节点；子节点索引 <= 0 表示叶子 `leaves[-idx]`
#[derive(Debug, Clone, Copy)]
struct TreeNode {
  left: i32,
  right: i32,
  feature: usize,
  threshold: f32,
}

#[derive(Debug, Clone, Default)]
struct WeakClassifier {
  nodes: Vec<TreeNode>,
  leaves: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
struct Stage {
  threshold: f32,
  classifiers: Vec<WeakClassifier>,
}

/// OpenCV 格式（BOOST + HAAR）的级联分类器
pub struct HaarCascade {
  window_width: u32,
  window_height: u32,
  stages: Vec<Stage>,
  features: Vec<HaarFeature>,
  params: DetectorParams,
}

impl std::fmt::Debug for HaarCascade {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("HaarCascade")
      .field("window", &(self.window_width, self.window_height))
      .field("stages", &self.stages.len())
      .field("features", &self.features.len())
      .field("params", &self.params)
      .finish()
  }
}

impl HaarCascade {
  pub fn from_file(path: &Path, params: DetectorParams) -> Result<Self, CascadeError> {
    info!("加载人脸级联定义: {}", path.display());
    let xml = std::fs::read_to_string(path)?;
    Self::from_xml_str(&xml, params)
  }

  pub fn from_xml_str(xml: &str, params: DetectorParams) -> Result<Self, CascadeError> {
    if !params.scale_factor.is_finite() || params.scale_factor <= 1.0 {
      return Err(CascadeError::InvalidParams(format!(
        "缩放步长必须大于 1, 实际为 {}",
        params.scale_factor
      )));
    }

    let cascade = parse_cascade_xml(xml)?.build(params)?;
    debug!(
      "级联定义: 窗口 {}x{}, {} 个阶段, {} 个特征",
      cascade.window_width,
      cascade.window_height,
      cascade.stages.len(),
      cascade.features.len()
    );
    Ok(cascade)
  }

  fn classify_window(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
    // 方差归一化区域为窗口四周各收缩 1 像素
    let norm_w = self.window_width - 2;
    let norm_h = self.window_height - 2;
    let area = (norm_w * norm_h) as f64;
    let sum = integral.rect_sum(x + 1, y + 1, norm_w, norm_h) as f64;
    let sqsum = integral.rect_sqsum(x + 1, y + 1, norm_w, norm_h) as f64;
    let nf = area * sqsum - sum * sum;
    if nf <= 0.0 {
      return false;
    }
    let nf = nf.sqrt();
    // 标准差不超过 MIN_WINDOW_STDDEV 的平坦窗口直接拒绝
    if area / nf >= 1.0 / MIN_WINDOW_STDDEV {
      return false;
    }
    let inv_nf = 1.0 / nf;

    for stage in &self.stages {
      let mut total = 0.0f64;
      for classifier in &stage.classifiers {
        let mut idx: i32 = 0;
        loop {
          let node = &classifier.nodes[idx as usize];
          let value = self.features[node.feature].eval(integral, x, y) * inv_nf;
          idx = if value < node.threshold as f64 {
            node.left
          } else {
            node.right
          };
          if idx <= 0 {
            break;
          }
        }
        total += classifier.leaves[(-idx) as usize] as f64;
      }
      if total < stage.threshold as f64 {
        return false;
      }
    }
    true
  }
}

impl FaceLocalizer for HaarCascade {
  fn locate(&self, gray: &GrayImage) -> Vec<FaceRegion> {
    let (img_w, img_h) = gray.dimensions();
    let scale = self.params.scale_factor as f64;
    let mut candidates = Vec::new();
    let mut factor = 1.0f64;

    loop {
      let scaled_w = (img_w as f64 / factor).round() as u32;
      let scaled_h = (img_h as f64 / factor).round() as u32;
      if scaled_w < self.window_width || scaled_h < self.window_height {
        break;
      }

      let win_w = (self.window_width as f64 * factor).round() as u32;
      let win_h = (self.window_height as f64 * factor).round() as u32;
      if win_w >= self.params.min_size && win_h >= self.params.min_size {
        let scaled: Cow<GrayImage> = if scaled_w == img_w && scaled_h == img_h {
          Cow::Borrowed(gray)
        } else {
          Cow::Owned(image::imageops::resize(
            gray,
            scaled_w,
            scaled_h,
            FilterType::Triangle,
          ))
        };
        let integral = IntegralImage::new(&scaled);
        let step = if factor > 2.0 { 1 } else { 2 };

        for y in (0..=scaled_h - self.window_height).step_by(step) {
          for x in (0..=scaled_w - self.window_width).step_by(step) {
            if self.classify_window(&integral, x, y) {
              candidates.push(FaceRegion::new(
                (x as f64 * factor).round() as u32,
                (y as f64 * factor).round() as u32,
                win_w,
                win_h,
              ));
            }
          }
        }
      }

      factor *= scale;
    }

    debug!("级联检测得到 {} 个候选窗口", candidates.len());
    let faces: Vec<FaceRegion> = group_rectangles(candidates, self.params.min_neighbors, GROUP_EPS)
      .into_iter()
      .filter_map(|r| r.clamp_to(img_w, img_h))
      .collect();
    debug!("聚类后保留 {} 个人脸区域", faces.len());
    faces
  }
}

/// 积分图与平方积分图，尺寸为 (w + 1) x (h + 1)
struct IntegralImage {
  stride: usize,
  sum: Vec<u64>,
  sqsum: Vec<u64>,
}

impl IntegralImage {
  fn new(image: &GrayImage) -> Self {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let stride = w + 1;
    let mut sum = vec![0u64; stride * (h + 1)];
    let mut sqsum = vec![0u64; stride * (h + 1)];

    for y in 0..h {
      let mut row_sum = 0u64;
      let mut row_sqsum = 0u64;
      for x in 0..w {
        let v = image.get_pixel(x as u32, y as u32)[0] as u64;
        row_sum += v;
        row_sqsum += v * v;
        let idx = (y + 1) * stride + x + 1;
        sum[idx] = sum[idx - stride] + row_sum;
        sqsum[idx] = sqsum[idx - stride] + row_sqsum;
      }
    }

    Self { stride, sum, sqsum }
  }

  fn rect_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
    Self::lookup(&self.sum, self.stride, x, y, w, h)
  }

  fn rect_sqsum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
    Self::lookup(&self.sqsum, self.stride, x, y, w, h)
  }

  fn lookup(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let (x0, y0) = (x as usize, y as usize);
    let (x1, y1) = (x0 + w as usize, y0 + h as usize);
    table[y1 * stride + x1] + table[y0 * stride + x0]
      - table[y0 * stride + x1]
      - table[y1 * stride + x0]
  }
}

fn similar(a: &FaceRegion, b: &FaceRegion, eps: f64) -> bool {
  let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
  let (ax, ay, aw, ah) = (a.x as f64, a.y as f64, a.width as f64, a.height as f64);
  let (bx, by, bw, bh) = (b.x as f64, b.y as f64, b.width as f64, b.height as f64);
  (ax - bx).abs() <= delta
    && (ay - by).abs() <= delta
    && (ax + aw - bx - bw).abs() <= delta
    && (ay + ah - by - bh).abs() <= delta
}

/// 并查集划分等价类，标签按首次出现顺序编号
fn partition(rects: &[FaceRegion], eps: f64) -> Vec<usize> {
  fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
      parent[i] = parent[parent[i]];
      i = parent[i];
    }
    i
  }

  let n = rects.len();
  let mut parent: Vec<usize> = (0..n).collect();
  for i in 0..n {
    for j in (i + 1)..n {
      if similar(&rects[i], &rects[j], eps) {
        let a = find(&mut parent, i);
        let b = find(&mut parent, j);
        if a != b {
          parent[b] = a;
        }
      }
    }
  }

  let mut label_of_root = vec![usize::MAX; n];
  let mut next = 0;
  let mut labels = Vec::with_capacity(n);
  for i in 0..n {
    let root = find(&mut parent, i);
    if label_of_root[root] == usize::MAX {
      label_of_root[root] = next;
      next += 1;
    }
    labels.push(label_of_root[root]);
  }
  labels
}

/// 候选框聚类：平均每个等价类，丢弃成员数不超过阈值的类，并抑制嵌套在更强类中的小框
fn group_rectangles(rects: Vec<FaceRegion>, group_threshold: u32, eps: f64) -> Vec<FaceRegion> {
  if group_threshold == 0 || rects.is_empty() {
    return rects;
  }

  let labels = partition(&rects, eps);
  let classes = labels.iter().max().map_or(0, |m| m + 1);
  let mut sums = vec![[0u64; 4]; classes];
  let mut counts = vec![0u32; classes];
  for (r, &label) in rects.iter().zip(&labels) {
    let s = &mut sums[label];
    s[0] += r.x as u64;
    s[1] += r.y as u64;
    s[2] += r.width as u64;
    s[3] += r.height as u64;
    counts[label] += 1;
  }

  let averaged: Vec<(FaceRegion, u32)> = sums
    .iter()
    .zip(&counts)
    .map(|(s, &n)| {
      let k = 1.0 / n as f64;
      let avg = |v: u64| (v as f64 * k).round() as u32;
      (FaceRegion::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3])), n)
    })
    .collect();

  let mut grouped = Vec::new();
  for (i, &(r1, n1)) in averaged.iter().enumerate() {
    if n1 <= group_threshold {
      continue;
    }

    let nested = averaged.iter().enumerate().any(|(j, &(r2, n2))| {
      if i == j || n2 <= group_threshold {
        return false;
      }
      let dx = (r2.width as f64 * eps).round() as i64;
      let dy = (r2.height as f64 * eps).round() as i64;
      let (x1, y1, w1, h1) = (r1.x as i64, r1.y as i64, r1.width as i64, r1.height as i64);
      let (x2, y2, w2, h2) = (r2.x as i64, r2.y as i64, r2.width as i64, r2.height as i64);
      x1 >= x2 - dx
        && y1 >= y2 - dy
        && x1 + w1 <= x2 + w2 + dx
        && y1 + h1 <= y2 + h2 + dy
        && (n2 > n1.max(3) || n1 < 3)
    });

    if !nested {
      grouped.push(r1);
    }
  }
  grouped
}

#[derive(Default)]
struct CascadeBuilder {
  width: Option<u32>,
  height: Option<u32>,
  feature_type: Option<String>,
  stages: Vec<Stage>,
  features: Vec<HaarFeature>,
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
  path.len() >= suffix.len()
    && path[path.len() - suffix.len()..]
      .iter()
      .zip(suffix)
      .all(|(a, b)| a == b)
}

fn parse_numbers<T: std::str::FromStr>(text: &str, what: &str) -> Result<Vec<T>, CascadeError> {
  text
    .split_whitespace()
    .map(|tok| {
      tok
        .parse::<T>()
        .map_err(|_| CascadeError::invalid(format!("{} 中的数值无效: {}", what, tok)))
    })
    .collect()
}

impl CascadeBuilder {
  fn open(&mut self, parent: &[String], name: &str) -> Result<(), CascadeError> {
    if name == "trees" {
      return Err(CascadeError::Unsupported("旧版级联格式".to_string()));
    }
    if name != "_" {
      return Ok(());
    }

    if ends_with(parent, &["stages"]) {
      self.stages.push(Stage::default());
    } else if ends_with(parent, &["weakClassifiers"]) {
      self
        .stages
        .last_mut()
        .ok_or_else(|| CascadeError::invalid("弱分类器出现在阶段之外"))?
        .classifiers
        .push(WeakClassifier::default());
    } else if ends_with(parent, &["features"]) {
      self.features.push(HaarFeature::default());
    }
    Ok(())
  }

  fn last_classifier(&mut self) -> Result<&mut WeakClassifier, CascadeError> {
    self
      .stages
      .last_mut()
      .and_then(|stage| stage.classifiers.last_mut())
      .ok_or_else(|| CascadeError::invalid("树节点出现在弱分类器之外"))
  }

  fn text(&mut self, path: &[String], text: &str) -> Result<(), CascadeError> {
    let Some(name) = path.last() else {
      return Ok(());
    };

    match name.as_str() {
      "width" if path.len() == 3 => {
        self.width = Some(parse_numbers::<u32>(text, "width")?.first().copied().unwrap_or(0));
      }
      "height" if path.len() == 3 => {
        self.height = Some(parse_numbers::<u32>(text, "height")?.first().copied().unwrap_or(0));
      }
      "featureType" => self.feature_type = Some(text.trim().to_string()),
      "stageThreshold" => {
        let threshold = parse_numbers::<f32>(text, "stageThreshold")?;
        let stage = self
          .stages
          .last_mut()
          .ok_or_else(|| CascadeError::invalid("阶段阈值出现在阶段之外"))?;
        stage.threshold = *threshold
          .first()
          .ok_or_else(|| CascadeError::invalid("阶段阈值为空"))?
          - STAGE_THRESHOLD_EPS;
      }
      "internalNodes" => {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() || tokens.len() % 4 != 0 {
          return Err(CascadeError::invalid(format!(
            "internalNodes 数值个数应为 4 的倍数, 实际为 {}",
            tokens.len()
          )));
        }
        let mut nodes = Vec::with_capacity(tokens.len() / 4);
        for chunk in tokens.chunks(4) {
          let ints = parse_numbers::<i64>(&chunk[..3].join(" "), "internalNodes")?;
          let threshold = parse_numbers::<f32>(chunk[3], "internalNodes")?[0];
          let feature = usize::try_from(ints[2])
            .map_err(|_| CascadeError::invalid(format!("特征索引无效: {}", ints[2])))?;
          let child = |v: i64| {
            i32::try_from(v).map_err(|_| CascadeError::invalid(format!("子节点索引无效: {}", v)))
          };
          nodes.push(TreeNode {
            left: child(ints[0])?,
            right: child(ints[1])?,
            feature,
            threshold,
          });
        }
        self.last_classifier()?.nodes = nodes;
      }
      "leafValues" => {
        let leaves = parse_numbers::<f32>(text, "leafValues")?;
        self.last_classifier()?.leaves = leaves;
      }
      "_" if ends_with(path, &["rects", "_"]) => {
        let values = parse_numbers::<f32>(text, "rects")?;
        if values.len() != 5 {
          return Err(CascadeError::invalid(format!(
            "矩形应包含 5 个数值, 实际为 {}",
            values.len()
          )));
        }
        let coord = |v: f32| {
          if v < 0.0 || v.fract() != 0.0 {
            Err(CascadeError::invalid(format!("矩形坐标无效: {}", v)))
          } else {
            Ok(v as u32)
          }
        };
        let rect = HaarRect {
          x: coord(values[0])?,
          y: coord(values[1])?,
          width: coord(values[2])?,
          height: coord(values[3])?,
          weight: values[4],
        };
        self
          .features
          .last_mut()
          .ok_or_else(|| CascadeError::invalid("矩形出现在特征之外"))?
          .rects
          .push(rect);
      }
      "tilted" if text.trim() != "0" => {
        return Err(CascadeError::Unsupported("倾斜 Haar 特征".to_string()));
      }
      _ => {}
    }
    Ok(())
  }

  fn build(self, params: DetectorParams) -> Result<HaarCascade, CascadeError> {
    if let Some(kind) = &self.feature_type
      && kind != "HAAR"
    {
      return Err(CascadeError::Unsupported(format!("特征类型 {}", kind)));
    }

    if self.stages.is_empty() {
      return Err(CascadeError::invalid("没有级联阶段"));
    }

    let (window_width, window_height) = match (self.width, self.height) {
      (Some(w), Some(h)) if w >= 3 && h >= 3 => (w, h),
      (w, h) => {
        return Err(CascadeError::invalid(format!(
          "检测窗口尺寸无效: {:?}x{:?}",
          w, h
        )));
      }
    };

    for (fi, feature) in self.features.iter().enumerate() {
      if feature.rects.is_empty() {
        return Err(CascadeError::invalid(format!("特征 {} 没有矩形", fi)));
      }
      for r in &feature.rects {
        if r.x + r.width > window_width || r.y + r.height > window_height {
          return Err(CascadeError::invalid(format!("特征 {} 的矩形超出检测窗口", fi)));
        }
      }
    }

    for (si, stage) in self.stages.iter().enumerate() {
      if stage.classifiers.is_empty() {
        return Err(CascadeError::invalid(format!("阶段 {} 没有弱分类器", si)));
      }
      for classifier in &stage.classifiers {
        if classifier.nodes.is_empty() || classifier.leaves.is_empty() {
          return Err(CascadeError::invalid(format!("阶段 {} 含有空的弱分类器", si)));
        }
        for (ni, node) in classifier.nodes.iter().enumerate() {
          if node.feature >= self.features.len() {
            return Err(CascadeError::invalid(format!(
              "阶段 {} 引用了不存在的特征 {}",
              si, node.feature
            )));
          }
          for child in [node.left, node.right] {
            let valid = if child <= 0 {
              ((-child) as usize) < classifier.leaves.len()
            } else {
              (child as usize) > ni && (child as usize) < classifier.nodes.len()
            };
            if !valid {
              return Err(CascadeError::invalid(format!(
                "阶段 {} 的树节点索引越界: {}",
                si, child
              )));
            }
          }
        }
      }
    }

    Ok(HaarCascade {
      window_width,
      window_height,
      stages: self.stages,
      features: self.features,
      params,
    })
  }
}

fn parse_cascade_xml(xml: &str) -> Result<CascadeBuilder, CascadeError> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut path: Vec<String> = Vec::new();
  let mut builder = CascadeBuilder::default();

  loop {
    match reader.read_event() {
      Ok(Event::Start(e)) => {
        let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
        builder.open(&path, &name)?;
        path.push(name);
      }
      Ok(Event::End(_)) => {
        path.pop();
      }
      Ok(Event::Text(t)) => {
        let text = t
          .unescape()
          .map_err(|e| CascadeError::Xml(e.to_string()))?;
        builder.text(&path, &text)?;
      }
      Ok(Event::Eof) => break,
      Err(e) => {
        return Err(CascadeError::Xml(format!(
          "位置 {}: {}",
          reader.buffer_position(),
          e
        )));
      }
      _ => {}
    }
  }

  Ok(builder)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Luma;

  // 6x6 窗口，单个树桩：下半部分比上半部分亮即判为正样本
  const SPLIT_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>6</height>
  <width>6</width>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0000000000000000e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 6 3 -1.</_>
        <_>
          0 3 6 3 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

  fn raw_params() -> DetectorParams {
    DetectorParams {
      scale_factor: 1.1,
      min_neighbors: 0,
      min_size: 0,
    }
  }

  fn split_image(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |_, y| if y < size / 2 { Luma([0]) } else { Luma([255]) })
  }

  #[test]
  fn parses_stump_cascade() {
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, raw_params()).unwrap();
    assert_eq!((cascade.window_width, cascade.window_height), (6, 6));
    assert_eq!(cascade.stages.len(), 1);
    assert_eq!(cascade.features.len(), 1);
    assert_eq!(cascade.features[0].rects.len(), 2);
    assert_eq!(cascade.stages[0].classifiers[0].leaves, vec![-1.0, 1.0]);
  }

  #[test]
  fn detects_window_matching_feature() {
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, raw_params()).unwrap();
    let faces = cascade.locate(&split_image(6));
    assert_eq!(faces, vec![FaceRegion::new(0, 0, 6, 6)]);
  }

  #[test]
  fn uniform_image_has_no_faces() {
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, raw_params()).unwrap();
    let image = GrayImage::from_pixel(20, 20, Luma([128]));
    assert!(cascade.locate(&image).is_empty());
  }

  #[test]
  fn flat_windows_are_rejected_even_when_stump_passes() {
    // 阈值为负时任何窗口的特征值都能通过树桩，只有方差检查能拒绝它们
    let xml = SPLIT_CASCADE.replace("0 -1 0 5.0000000000000000e-01", "0 -1 0 -0.5");
    let params = DetectorParams {
      scale_factor: 1.1,
      min_neighbors: 5,
      min_size: 6,
    };
    let cascade = HaarCascade::from_xml_str(&xml, params).unwrap();
    assert!(cascade.locate(&GrayImage::from_pixel(60, 60, Luma([128]))).is_empty());
    assert!(cascade.locate(&GrayImage::from_pixel(60, 60, Luma([255]))).is_empty());
  }

  #[test]
  fn low_contrast_window_is_rejected() {
    // 上下两半只差 8 个灰度级，标准差为 4
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, raw_params()).unwrap();
    let image = GrayImage::from_fn(6, 6, |_, y| if y < 3 { Luma([120]) } else { Luma([128]) });
    assert!(cascade.locate(&image).is_empty());
  }

  #[test]
  fn stage_threshold_is_relaxed_by_epsilon() {
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, raw_params()).unwrap();
    assert!((cascade.stages[0].threshold + STAGE_THRESHOLD_EPS).abs() < 1e-9);
  }

  #[test]
  fn windows_below_min_size_are_skipped() {
    let params = DetectorParams {
      min_size: 7,
      ..raw_params()
    };
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, params).unwrap();
    assert!(cascade.locate(&split_image(6)).is_empty());
  }

  #[test]
  fn image_smaller_than_window_has_no_faces() {
    let cascade = HaarCascade::from_xml_str(SPLIT_CASCADE, raw_params()).unwrap();
    assert!(cascade.locate(&GrayImage::new(4, 4)).is_empty());
  }

  #[test]
  fn rejects_scale_factor_not_above_one() {
    let params = DetectorParams {
      scale_factor: 1.0,
      ..raw_params()
    };
    let err = HaarCascade::from_xml_str(SPLIT_CASCADE, params).unwrap_err();
    assert!(matches!(err, CascadeError::InvalidParams(_)));
  }

  #[test]
  fn rejects_dangling_feature_index() {
    let xml = SPLIT_CASCADE.replace("0 -1 0 5.0000000000000000e-01", "0 -1 3 0.5");
    let err = HaarCascade::from_xml_str(&xml, raw_params()).unwrap_err();
    assert!(matches!(err, CascadeError::Invalid(_)));
  }

  #[test]
  fn rejects_legacy_format() {
    let xml = r#"<opencv_storage><haarcascade_frontalface_alt type_id="opencv-haar-classifier">
      <size>20 20</size><stages><_><trees><_><_><feature><rects><_>3 7 14 4 -1.</_></rects></feature>
      </_></_></trees></_></stages></haarcascade_frontalface_alt></opencv_storage>"#;
    let err = HaarCascade::from_xml_str(xml, raw_params()).unwrap_err();
    assert!(matches!(err, CascadeError::Unsupported(_)), "{:?}", err);
  }

  #[test]
  fn rejects_non_haar_features() {
    let xml = SPLIT_CASCADE.replace("<featureType>HAAR", "<featureType>LBP");
    let err = HaarCascade::from_xml_str(&xml, raw_params()).unwrap_err();
    assert!(matches!(err, CascadeError::Unsupported(_)));
  }

  #[test]
  fn integral_image_sums_rectangles() {
    let image = GrayImage::from_fn(4, 3, |x, y| Luma([(x + y * 4) as u8]));
    let integral = IntegralImage::new(&image);
    assert_eq!(integral.rect_sum(0, 0, 4, 3), (0..12).sum::<u64>());
    // 像素 5, 6, 9, 10
    assert_eq!(integral.rect_sum(1, 1, 2, 2), 5 + 6 + 9 + 10);
    assert_eq!(integral.rect_sqsum(1, 1, 2, 2), 25 + 36 + 81 + 100);
  }

  #[test]
  fn grouping_keeps_dense_clusters_only() {
    let rects = vec![
      FaceRegion::new(10, 10, 40, 40),
      FaceRegion::new(12, 11, 40, 40),
      FaceRegion::new(11, 12, 42, 42),
      FaceRegion::new(200, 200, 40, 40),
    ];
    let grouped = group_rectangles(rects, 1, GROUP_EPS);
    assert_eq!(grouped, vec![FaceRegion::new(11, 11, 41, 41)]);
  }

  #[test]
  fn grouping_suppresses_nested_weaker_cluster() {
    let mut rects = vec![FaceRegion::new(100, 100, 100, 100); 6];
    rects.extend(vec![FaceRegion::new(130, 130, 30, 30); 2]);
    let grouped = group_rectangles(rects, 1, GROUP_EPS);
    assert_eq!(grouped, vec![FaceRegion::new(100, 100, 100, 100)]);
  }

  #[test]
  fn zero_neighbors_skips_grouping() {
    let rects = vec![FaceRegion::new(0, 0, 10, 10), FaceRegion::new(1, 1, 10, 10)];
    assert_eq!(group_rectangles(rects.clone(), 0, GROUP_EPS), rects);
  }

  #[test]
  fn resolves_configured_then_bundled() {
    let dir = tempfile::tempdir().unwrap();
    let configured = dir.path().join("local.xml");
    let bundled = dir.path().join("bundled.xml");
    std::fs::write(&bundled, SPLIT_CASCADE).unwrap();
    let bundled_str = bundled.to_str().unwrap();

    let source = resolve_with_defaults(Some(&configured), &[bundled_str]).unwrap();
    assert_eq!(source, CascadeSource::Bundled(bundled.clone()));
    assert!(source.is_fallback());

    std::fs::write(&configured, SPLIT_CASCADE).unwrap();
    let source = resolve_with_defaults(Some(&configured), &[bundled_str]).unwrap();
    assert_eq!(source, CascadeSource::Configured(configured));

    let missing = dir.path().join("missing.xml");
    let err = resolve_with_defaults(None, &[missing.to_str().unwrap()]).unwrap_err();
    assert!(matches!(err, CascadeError::NotFound));
  }
}
