use serde::{Deserialize, Serialize};
use serde_json::Value;
use super::client::FunctionsClient;
use super::errors::Result;

/// 从转写文本中抽取出的比赛事件
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    /// 比赛分钟
    pub minute: Option<u32>,
    /// goal / card / substitution / chance ...
    #[serde(rename = "type")]
    pub event_type: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

/// 事件抽取请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractEventsRequest {
    pub transcript: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half: Option<String>,
}

#[derive(Deserialize)]
struct EventsPayload {
    #[serde(default)]
    events: Value,
}

/// 调用 `extract-live-events`，模型输出解析失败时返回空列表而不是报错
pub async fn extract_live_events(
    client: &FunctionsClient,
    request: &ExtractEventsRequest,
) -> Result<Vec<LiveEvent>> {
    let payload: EventsPayload = client.invoke("extract-live-events", request).await?;
    Ok(parse_events_value(&payload.events))
}

/// 函数有时返回结构化数组，有时返回模型原文；两种都接受
pub fn parse_events_value(value: &Value) -> Vec<LiveEvent> {
    match value {
        Value::Array(_) => match serde_json::from_value::<Vec<LiveEvent>>(value.clone()) {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!("Discarding malformed event array: {}", err);
                Vec::new()
            }
        },
        Value::String(raw) => parse_events_text(raw),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!("Unexpected events payload shape: {}", other);
            Vec::new()
        }
    }
}

/// 解析模型原文：剥掉 ```json 围栏后尝试数组或 `{events: [...]}` 两种形态
pub fn parse_events_text(raw: &str) -> Vec<LiveEvent> {
    #[derive(Deserialize)]
    struct Wrapper {
        events: Vec<LiveEvent>,
    }

    let cleaned = strip_code_fence(raw);

    if let Ok(events) = serde_json::from_str::<Vec<LiveEvent>>(cleaned) {
        return events;
    }
    if let Ok(wrapper) = serde_json::from_str::<Wrapper>(cleaned) {
        return wrapper.events;
    }

    tracing::warn!("Could not parse events from model output, treating as no result");
    Vec::new()
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // 第一行可能是语言标记（```json）
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };

    rest.strip_suffix("```").map(str::trim).unwrap_or(rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_structured_array() {
        let value = json!([
            {"minute": 23, "type": "goal", "description": "Header from the corner", "player": "N. Silva"},
            {"minute": 45, "type": "card", "description": "Late tackle"}
        ]);

        let events = parse_events_value(&value);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "goal");
        assert_eq!(events[0].player.as_deref(), Some("N. Silva"));
        assert_eq!(events[1].minute, Some(45));
    }

    #[test]
    fn test_parse_fenced_model_output() {
        let raw = "```json\n[{\"minute\": 12, \"type\": \"chance\", \"description\": \"Shot off the post\"}]\n```";
        let events = parse_events_text(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "chance");
    }

    #[test]
    fn test_parse_wrapped_object() {
        let raw = "{\"events\": [{\"minute\": 67, \"type\": \"substitution\", \"description\": \"Fresh legs up front\"}]}";
        let events = parse_events_text(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].minute, Some(67));
    }

    #[test]
    fn test_malformed_payload_yields_empty() {
        // 模型没有按要求输出 JSON，按零事件处理
        assert!(parse_events_text("The match was exciting but I cannot produce JSON.").is_empty());
        assert!(parse_events_text("```json\n{broken").is_empty());
        assert!(parse_events_value(&json!({"unexpected": true})).is_empty());
        assert!(parse_events_value(&json!(42)).is_empty());
    }

    #[test]
    fn test_null_events_yield_empty() {
        assert!(parse_events_value(&serde_json::Value::Null).is_empty());
    }
}
