// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/model/http_source.rs - 远程 HTTP 预测源
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

use std::{path::Path, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Prediction, PredictionSource, PredictionSourceError, parse_predictions},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const TIMEOUT_PARAMETER: &str = "timeout";

/// 以表单方式 POST base64 编码的图像，URL 的查询串携带 API key 等参数
pub struct HttpSource {
  endpoint: Url,
  timeout: Duration,
  agent: ureq::Agent,
}

impl FromUrlWithScheme for HttpSource {
  const SCHEME: &'static str = "https";
}

impl FromUrl for HttpSource {
  type Error = PredictionSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME && url.scheme() != "http" {
      return Err(PredictionSourceError::SchemeMismatch(format!(
        "期望 '{}' 或 'http', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let timeout = url
      .query_pairs()
      .find(|(k, _)| k == TIMEOUT_PARAMETER)
      .and_then(|(_, v)| v.parse::<u64>().ok())
      .map(Duration::from_secs)
      .unwrap_or(DEFAULT_TIMEOUT);

    // timeout 只在本地使用，不转发给上游
    let forwarded: Vec<(String, String)> = url
      .query_pairs()
      .filter(|(k, _)| k != TIMEOUT_PARAMETER)
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();
    let mut endpoint = url.clone();
    if forwarded.is_empty() {
      endpoint.set_query(None);
    } else {
      endpoint.query_pairs_mut().clear().extend_pairs(&forwarded);
    }

    let agent = ureq::AgentBuilder::new().timeout(timeout).build();

    Ok(HttpSource {
      endpoint,
      timeout,
      agent,
    })
  }
}

impl HttpSource {
  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }
}

impl PredictionSource for HttpSource {
  fn predict(&self, image: &Path) -> Result<Vec<Prediction>, PredictionSourceError> {
    let bytes = std::fs::read(image)?;
    let body = STANDARD.encode(bytes);

    info!("请求远程预测源: {}", self.endpoint.host_str().unwrap_or("<unknown>"));
    let response = self
      .agent
      .post(self.endpoint.as_str())
      .set("Content-Type", "application/x-www-form-urlencoded")
      .send_string(&body);

    let value: serde_json::Value = match response {
      Ok(response) => {
        let text = response.into_string()?;
        serde_json::from_str(&text).map_err(|e| PredictionSourceError::Malformed(e.to_string()))?
      }
      Err(ureq::Error::Status(code, response)) => {
        let detail = response.into_string().unwrap_or_default();
        return Err(PredictionSourceError::Service(format!(
          "HTTP {}: {}",
          code,
          detail.trim()
        )));
      }
      Err(e) => return Err(PredictionSourceError::Unreachable(e.to_string())),
    };

    debug!("远程预测源响应: {}", value);
    parse_predictions(&value)
  }
}
