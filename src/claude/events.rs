use serde_json::Value;

/// One classified line of `claude --output-format stream-json` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Terminal event carrying the final answer.
    Result { text: String },
    ContentBlockStart {
        index: u64,
        kind: String,
        name: Option<String>,
        id: Option<String>,
    },
    ContentBlockStop { index: u64 },
    TextDelta { index: Option<u64>, text: String },
    InputJsonDelta { index: u64, partial_json: String },
    ToolResultDelta { text: String },
    ToolResult { parts: Vec<String> },
    /// Tool output echoed back inside a `user` message.
    UserToolResult { content: Vec<String> },
    RawText { text: String },
    Unrecognized,
}

/// Parse one stdout line. Blank lines, non-JSON lines and non-object JSON yield `None`.
pub fn decode_line(raw: &str) -> Option<Event> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(line).ok()?;
    if !value.is_object() {
        return None;
    }
    Some(classify(&value))
}

/// Classify an already-parsed event object, unwrapping one `stream_event` envelope.
pub fn classify(value: &Value) -> Event {
    let event = unwrap_envelope(value);
    match str_field(event, "type") {
        Some("result") => Event::Result {
            text: str_field(event, "result").unwrap_or_default().to_string(),
        },
        Some("content_block_start") => {
            let block = event.get("content_block").unwrap_or(&Value::Null);
            Event::ContentBlockStart {
                index: index_of(event),
                kind: str_field(block, "type").unwrap_or_default().to_string(),
                name: str_field(block, "name").map(str::to_string),
                id: str_field(block, "id").map(str::to_string),
            }
        }
        Some("content_block_stop") => Event::ContentBlockStop {
            index: index_of(event),
        },
        Some("content_block_delta") | Some("message_delta") => classify_delta(event),
        Some("tool_result_delta") => {
            let delta = delta_of(event);
            match str_field(delta, "type") {
                Some("output_text_delta") => Event::ToolResultDelta {
                    text: str_field(delta, "text").unwrap_or_default().to_string(),
                },
                _ => Event::Unrecognized,
            }
        }
        Some("tool_result") => Event::ToolResult {
            parts: array_field(event, "content")
                .filter(|part| str_field(part, "type") == Some("output_text"))
                .map(|part| str_field(part, "text").unwrap_or_default().to_string())
                .collect(),
        },
        Some("user") => {
            let message = event.get("message").unwrap_or(&Value::Null);
            Event::UserToolResult {
                content: array_field(message, "content")
                    .filter(|item| str_field(item, "type") == Some("tool_result"))
                    .filter_map(|item| tool_result_text(item.get("content")?))
                    .collect(),
            }
        }
        _ => match str_field(event, "text") {
            Some(text) => Event::RawText {
                text: text.to_string(),
            },
            None => Event::Unrecognized,
        },
    }
}

fn classify_delta(event: &Value) -> Event {
    let delta = delta_of(event);
    match str_field(delta, "type") {
        Some("input_json_delta") => Event::InputJsonDelta {
            index: index_of(event),
            partial_json: str_field(delta, "partial_json")
                .unwrap_or_default()
                .to_string(),
        },
        Some("text_delta") | Some("output_text_delta") => Event::TextDelta {
            index: event.get("index").and_then(Value::as_u64),
            text: str_field(delta, "text").unwrap_or_default().to_string(),
        },
        _ => Event::Unrecognized,
    }
}

fn unwrap_envelope(value: &Value) -> &Value {
    if str_field(value, "type") == Some("stream_event") {
        value.get("event").unwrap_or(&Value::Null)
    } else {
        value
    }
}

/// Tool output is either a plain string or a list of `{"type":"text"}` parts.
fn tool_result_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| str_field(part, "type") == Some("text"))
                .filter_map(|part| str_field(part, "text"))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

fn delta_of(event: &Value) -> &Value {
    event.get("delta").unwrap_or(&Value::Null)
}

fn index_of(event: &Value) -> u64 {
    event.get("index").and_then(Value::as_u64).unwrap_or(0)
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn array_field<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}
