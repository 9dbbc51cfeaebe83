// 该文件是 NOVA Crops （新星裁剪） 项目的一部分。
// src/extract.rs - 从混杂输出中提取 JSON 结果对象
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

//! 工作进程的 stdout 同时承载日志与结果对象，不能整体当作 JSON 解析。
//! 这里按花括号深度扫描候选对象，候选解析失败时回溯并继续扫描。

use serde_json::{Map, Value};
use tracing::debug;

pub type ParsedObject = Map<String, Value>;

/// 按优先级依次扫描各输出流，返回第一个可解析的 JSON 对象
pub fn extract<S: AsRef<str>>(streams: &[S]) -> Option<ParsedObject> {
  streams
    .iter()
    .enumerate()
    .find_map(|(index, stream)| {
      let found = extract_from(stream.as_ref());
      if found.is_some() {
        debug!("在第 {} 个输出流中找到结果对象", index);
      }
      found
    })
}

/// 扫描单个文本，返回第一个可解析的 JSON 对象
pub fn extract_from(text: &str) -> Option<ParsedObject> {
  let bytes = text.as_bytes();
  let mut cursor = 0;

  while cursor < bytes.len() {
    // `{` 与 `}` 均为单字节 ASCII，字节下标总落在字符边界上
    let start = cursor + text[cursor..].find('{')?;

    match balanced_end(bytes, start) {
      Some(end) => {
        if let Some(object) = parse_object(&text[start..=end]).or_else(|| parse_prefix(&text[start..]))
        {
          return Some(object);
        }
        debug!("丢弃无法解析的候选对象: 字节 {}..={}", start, end);
        cursor = end + 1;
      }
      None => {
        if let Some(object) = parse_prefix(&text[start..]) {
          return Some(object);
        }
        // 未闭合的 `{`，从它之后重新寻找
        cursor = start + 1;
      }
    }
  }

  None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
  let mut depth = 0usize;
  for (offset, byte) in bytes[start..].iter().enumerate() {
    match byte {
      b'{' => depth += 1,
      b'}' => {
        depth -= 1;
        if depth == 0 {
          return Some(start + offset);
        }
      }
      _ => {}
    }
  }
  None
}

fn parse_object(candidate: &str) -> Option<ParsedObject> {
  match serde_json::from_str::<Value>(candidate) {
    Ok(Value::Object(object)) => Some(object),
    _ => None,
  }
}

/// 感知字符串的解析：字符串内容里含有花括号时，朴素配对会截错位置
fn parse_prefix(text: &str) -> Option<ParsedObject> {
  let mut values = serde_json::Deserializer::from_str(text).into_iter::<Value>();
  match values.next() {
    Some(Ok(Value::Object(object))) => Some(object),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn as_value(object: Option<ParsedObject>) -> Option<Value> {
    object.map(Value::Object)
  }

  #[test]
  fn finds_object_surrounded_by_log_text() {
    let text = "loading model...\nconnected\n{\"count\": 2, \"ok\": true}\ndone\n";
    assert_eq!(
      as_value(extract(&[text])),
      Some(json!({"count": 2, "ok": true}))
    );
  }

  #[test]
  fn backtracks_past_unparseable_fragment() {
    let text = "progress {stage 1 of 3} then {\"image\": \"a.png\"}";
    assert_eq!(as_value(extract(&[text])), Some(json!({"image": "a.png"})));
  }

  #[test]
  fn recovers_object_with_braces_inside_strings() {
    let text = "log: {\"error\": \"unexpected } in input\"} trailing";
    assert_eq!(
      as_value(extract(&[text])),
      Some(json!({"error": "unexpected } in input"}))
    );
  }

  #[test]
  fn skips_unterminated_brace() {
    let text = "warning: { never closed\n{\"a\": 1}";
    assert_eq!(as_value(extract(&[text])), Some(json!({"a": 1})));
  }

  #[test]
  fn handles_nested_objects() {
    let text = "x {\"outer\": {\"inner\": [1, 2]}} y";
    assert_eq!(
      as_value(extract(&[text])),
      Some(json!({"outer": {"inner": [1, 2]}}))
    );
  }

  #[test]
  fn falls_back_to_second_stream() {
    let stdout = "nothing structured here";
    let stderr = "Traceback...\n{\"error\": \"boom\"}";
    assert_eq!(
      as_value(extract(&[stdout, stderr])),
      Some(json!({"error": "boom"}))
    );
  }

  #[test]
  fn primary_stream_wins() {
    let stdout = "{\"from\": \"stdout\"}";
    let stderr = "{\"from\": \"stderr\"}";
    assert_eq!(
      as_value(extract(&[stdout, stderr])),
      Some(json!({"from": "stdout"}))
    );
  }

  #[test]
  fn returns_none_without_candidates() {
    assert_eq!(extract(&["", "}}} {{ {", "[1, 2, 3]"]), None);
    assert_eq!(extract::<&str>(&[]), None);
  }

  #[test]
  fn ignores_stray_closing_braces_and_non_ascii_text() {
    let text = "}} 日志输出 ✓ {\"类别\": \"眼睛\"}";
    assert_eq!(as_value(extract(&[text])), Some(json!({"类别": "眼睛"})));
  }
}
