// 该文件是 MoodMelody （心情旋律） 项目的一部分。
// src/sink/sheets.rs - 在线表格反馈写入端
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

use reqwest::blocking::Client;
use serde_json::json;
use tracing::{debug, error, info};
use url::Url;

use super::{FeedbackRecord, FeedbackSink, SinkError};
use crate::{FromUrl, FromUrlWithScheme};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_DEFAULT_RANGE: &str = "Sheet1";
const SHEETS_DEFAULT_TOKEN_ENV: &str = "MOODMELODY_SHEETS_TOKEN";

/// 通过 `values:append` 接口向在线表格追加一行
///
/// 地址形如 `sheets://<spreadsheet-id>/<range>?token_env=VAR`，
/// 访问令牌从环境变量读取。写入不带幂等键，调用方重试可能产生重复行。
pub struct SheetsSink {
  client: Client,
  endpoint: String,
  token: String,
}

impl FromUrlWithScheme for SheetsSink {
  const SCHEME: &'static str = "sheets";
}

impl FromUrl for SheetsSink {
  type Error = SinkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SinkError::SchemeMismatch(url.scheme().to_string()));
    }

    let spreadsheet = url
      .host_str()
      .filter(|h| !h.is_empty())
      .ok_or_else(|| SinkError::InvalidUrl(format!("缺少表格标识: {}", url)))?
      .to_string();
    let range = match url.path().trim_matches('/') {
      "" => SHEETS_DEFAULT_RANGE.to_string(),
      path => urlencoding::decode(path)
        .map_err(|_| SinkError::InvalidUrl(url.to_string()))?
        .into_owned(),
    };

    let mut token_env = SHEETS_DEFAULT_TOKEN_ENV.to_string();
    let mut api_base = SHEETS_API_BASE.to_string();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "token_env" => token_env = value.into_owned(),
        "api" => api_base = value.trim_end_matches('/').to_string(),
        _ => {}
      }
    }

    let token = std::env::var(&token_env)
      .ok()
      .filter(|t| !t.is_empty())
      .ok_or(SinkError::MissingCredentials(token_env))?;

    Ok(SheetsSink {
      client: Client::new(),
      endpoint: append_endpoint(&api_base, &spreadsheet, &range),
      token,
    })
  }
}

fn append_endpoint(api_base: &str, spreadsheet: &str, range: &str) -> String {
  format!(
    "{}/{}/values/{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
    api_base,
    urlencoding::encode(spreadsheet),
    urlencoding::encode(range)
  )
}

impl FeedbackSink for SheetsSink {
  fn append(&self, record: &FeedbackRecord) -> Result<(), SinkError> {
    let body = json!({
      "values": [[record.timestamp, record.name, record.rating, record.comment]]
    });
    debug!("追加反馈到在线表格: {}", self.endpoint);

    let response = self
      .client
      .post(&self.endpoint)
      .bearer_auth(&self.token)
      .json(&body)
      .send()?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().unwrap_or_default();
      error!("在线表格拒绝写入: {} {}", status, body);
      return Err(SinkError::Rejected {
        status: status.as_u16(),
        body,
      });
    }

    info!("反馈已写入在线表格");
    Ok(())
  }
}
