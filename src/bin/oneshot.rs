// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/bin/oneshot.rs - 单张图像情绪检测与推荐
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use moodmelody::{
  FromUrl,
  assets::Assets,
  config::AssetArgs,
  input::ImageFileInput,
  model::EmotionLabel,
  output::{Render, SaveImageFileOutput},
  pipeline::PipelineError,
  recommend::recommend,
};

/// MoodMelody 单张图像检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub assets: AssetArgs,
  /// 输入图像，例如 image:///path/face.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 标注结果输出路径，例如 image:///path/annotated.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.assets.model);
  info!("输入来源: {}", args.input);

  let assets = Assets::load(&args.assets);
  for diagnostic in assets.diagnostics() {
    warn!("{}", diagnostic);
  }

  let pipeline = assets.pipeline()?;
  let input = ImageFileInput::from_url(&args.input)?;
  let output = args
    .output
    .as_ref()
    .map(SaveImageFileOutput::from_url)
    .transpose()?;

  let mut rng = rand::rng();
  for frame in input {
    let region = match pipeline.detect(&frame) {
      Ok(detection) => {
        println!("情绪: {}", detection.label);
        for (label, p) in EmotionLabel::ALL
          .iter()
          .zip(detection.scores.probabilities())
        {
          println!("  {:<8} {:.3}", label.as_str(), p);
        }
        let recommendations = recommend(
          assets.catalog(),
          detection.label,
          args.assets.count,
          &mut rng,
        );
        for (idx, track) in recommendations.iter().enumerate() {
          println!(
            "{:>2}. {} - {} ({})",
            idx + 1,
            track.name,
            track.artist,
            track.embed_url()
          );
        }
        Some(detection.region)
      }
      Err(PipelineError::NoFaceDetected) => {
        println!("未检测到人脸");
        None
      }
      Err(e) => return Err(e.into()),
    };

    if let Some(output) = &output {
      output.render_result(&frame, &region)?;
    }
  }

  Ok(())
}
