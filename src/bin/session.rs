// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/bin/session.rs - 交互式会话驱动
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
  io::{BufRead, Write},
  sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use moodmelody::{
  assets::Assets,
  config::AssetArgs,
  frame::Frame,
  session::{Page, Session, SessionError, SessionState},
  sink::{FeedbackSink, SinkWrapper},
};

/// MoodMelody 交互式会话
///
/// 从标准输入逐行读取命令:
///   home | webcam | upload | feedback   切换页面
///   frame <图像路径>                     提交一帧图像
///   shuffle                             按当前情绪换一批推荐
///   submit <满意度 0-4 或 -> <姓名> [留言…]
///   state                               打印当前状态
///   quit                                退出
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, verbatim_doc_comment)]
pub struct Args {
  #[command(flatten)]
  pub assets: AssetArgs,
}

enum Command {
  Navigate(Page),
  Frame(String),
  Shuffle,
  Submit {
    rating: Option<u8>,
    name: String,
    comment: String,
  },
  State,
  Quit,
}

fn parse_command(line: &str) -> Option<Command> {
  let mut parts = line.split_whitespace();
  let head = parts.next()?;
  match head {
    "frame" => Some(Command::Frame(parts.collect::<Vec<_>>().join(" "))),
    "shuffle" => Some(Command::Shuffle),
    "submit" => {
      let rating = match parts.next()? {
        "-" => None,
        value => Some(value.parse().ok()?),
      };
      let name = parts.next().unwrap_or_default().to_string();
      let comment = parts.collect::<Vec<_>>().join(" ");
      Some(Command::Submit {
        rating,
        name,
        comment,
      })
    }
    "state" => Some(Command::State),
    "quit" | "exit" => Some(Command::Quit),
    page => page.parse().ok().map(Command::Navigate),
  }
}

fn print_state(state: &SessionState) {
  println!("页面: {}", state.page());
  match state.last_emotion() {
    Some(label) => println!("情绪: {}", label),
    None => println!("情绪: -"),
  }
  for (idx, track) in state.recommendations().iter().enumerate() {
    println!(
      "  {:>2}. {} - {} ({})",
      idx + 1,
      track.name,
      track.artist,
      track.embed_url()
    );
  }
  if let Some(frame) = state.processed_frame() {
    println!("图像: {}x{}", frame.width(), frame.height());
  }
  println!(
    "反馈: {}",
    if state.feedback_submitted() {
      "已提交"
    } else {
      "未提交"
    }
  );
}

fn report(result: Result<&SessionState, SessionError>) {
  match result {
    Ok(state) => print_state(state),
    Err(e) => println!("错误: {}", e),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let assets = Assets::shared(&args.assets);
  for diagnostic in assets.diagnostics() {
    warn!("{}", diagnostic);
  }

  let sink = SinkWrapper::from_optional_url(args.assets.feedback.as_ref())?;
  if sink.is_simulated() {
    warn!("反馈将以模拟模式运行");
  }
  let sink: Arc<dyn FeedbackSink + Send + Sync> = Arc::new(sink);

  let mut session = Session::new(assets, sink).with_recommendation_count(args.assets.count);
  info!("会话已开始");
  print_state(session.state());

  let stdin = std::io::stdin();
  let mut stdout = std::io::stdout();
  for line in stdin.lock().lines() {
    let line = line?;
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    match parse_command(line) {
      Some(Command::Navigate(page)) => print_state(session.navigate(page)),
      Some(Command::Frame(path)) => {
        let frame = std::fs::read(&path)
          .map_err(anyhow::Error::from)
          .and_then(|bytes| Frame::from_bytes(&bytes).map_err(anyhow::Error::from));
        match frame {
          Ok(frame) => report(session.submit_frame(frame)),
          Err(e) => println!("无法读取图像 {}: {}", path, e),
        }
      }
      Some(Command::Shuffle) => print_state(session.request_shuffle()),
      Some(Command::Submit {
        rating,
        name,
        comment,
      }) => report(session.submit_feedback(&name, rating, &comment)),
      Some(Command::State) => print_state(session.state()),
      Some(Command::Quit) => break,
      None => println!("无法识别的命令: {}", line),
    }
    stdout.flush()?;
  }

  info!("会话结束");
  Ok(())
}
