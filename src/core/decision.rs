//! 决策解析：从视觉模型的自由文本中提取 JSON 决策
//!
//! 依次尝试：```json 围栏代码块、第一个 `{` 到最后一个 `}` 的片段、整段文本；
//! 每个候选先按 JSON 解析，失败再按 Python 字面量风格（单引号、True/False/None）宽松解析一次。
//! 全部失败即 AgentError::Parse（单步致命）。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 单步决策
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action_name: String,
    /// 模型常输出 `"params": []`，统一归一为对象
    #[serde(default, deserialize_with = "params_map")]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub analysis: String,
    #[serde(default = "default_goal")]
    pub current_goal: String,
    #[serde(default)]
    pub last_goal_reached: Option<bool>,
}

fn default_goal() -> String {
    "none".to_string()
}

fn params_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .flatten()
            .collect()),
        other => Err(serde::de::Error::custom(format!(
            "params must be an object, got {}",
            other
        ))),
    }
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)\n?\s*```").expect("valid regex"))
}

fn python_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(True|False|None)\b").expect("valid regex"))
}

/// 候选 JSON 文本（按优先级）
fn candidates(text: &str) -> Vec<&str> {
    let trimmed = text.trim();
    let mut out = Vec::with_capacity(3);

    if let Some(caps) = fenced_block().captures(trimmed) {
        if let Some(m) = caps.get(1) {
            out.push(m.as_str().trim());
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            out.push(&trimmed[start..=end]);
        }
    }
    out.push(trimmed);
    out
}

/// 把 Python 字面量风格的 dict（模型常这样输出）转成 JSON
fn relax(candidate: &str) -> String {
    let swapped = python_literal().replace_all(candidate, |caps: &regex::Captures| {
        match &caps[1] {
            "True" => "true",
            "False" => "false",
            _ => "null",
        }
    });
    swapped.replace('\'', "\"")
}

fn decode(candidate: &str) -> Result<Decision, String> {
    let decision: Decision = match serde_json::from_str(candidate) {
        Ok(d) => d,
        Err(strict) => serde_json::from_str(&relax(candidate)).map_err(|_| strict.to_string())?,
    };
    if decision.action_name.trim().is_empty() {
        return Err("empty action_name".to_string());
    }
    Ok(decision)
}

/// 解析模型输出为 Decision
pub fn parse_decision(raw: &str) -> Result<Decision, AgentError> {
    if !raw.contains('{') {
        return Err(AgentError::Parse(format!("no JSON object in response: {}", raw.trim())));
    }

    let mut last_err = String::new();
    for candidate in candidates(raw) {
        match decode(candidate) {
            Ok(decision) => return Ok(decision),
            Err(e) => last_err = e,
        }
    }
    Err(AgentError::Parse(format!("{}: {}", last_err, raw.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block() {
        let raw = "```json\n{\"action_name\":\"land\",\"params\":{}}\n```";
        let d = parse_decision(raw).unwrap();
        assert_eq!(d.action_name, "land");
        assert!(d.params.is_empty());
    }

    #[test]
    fn test_bare_object_parses_identically() {
        let fenced = parse_decision("```json\n{\"action_name\":\"land\",\"params\":{}}\n```").unwrap();
        let bare = parse_decision("{\"action_name\":\"land\"}").unwrap();
        assert_eq!(fenced, bare);
        assert_eq!(bare.current_goal, "none");
    }

    #[test]
    fn test_object_inside_prose() {
        let raw = "I will turn.\n{\"action_name\": \"turn_left\", \"params\": [], \"analysis\": \"no ship\", \"current_goal\": \"search\"}\nDone.";
        let d = parse_decision(raw).unwrap();
        assert_eq!(d.action_name, "turn_left");
        assert_eq!(d.analysis, "no ship");
        assert_eq!(d.current_goal, "search");
    }

    #[test]
    fn test_params_object_kept() {
        let d = parse_decision(r#"{"action_name":"fly_to","params":{"x":1100,"y":2500}}"#).unwrap();
        assert_eq!(d.params.get("x"), Some(&Value::from(1100)));
        assert_eq!(d.params.len(), 2);
    }

    #[test]
    fn test_python_literal_fallback() {
        let d = parse_decision("{'action_name': 'hover', 'params': {}, 'last_goal_reached': True}").unwrap();
        assert_eq!(d.action_name, "hover");
        assert_eq!(d.last_goal_reached, Some(true));
    }

    #[test]
    fn test_no_json_is_error() {
        let err = parse_decision("I think we should land now.").unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }

    #[test]
    fn test_missing_action_name_is_error() {
        assert!(parse_decision(r#"{"params":{}}"#).is_err());
        assert!(parse_decision(r#"{"action_name":"  "}"#).is_err());
    }
}
