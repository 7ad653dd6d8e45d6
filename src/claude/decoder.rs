use super::events::{decode_line, Event};
use crate::{log_debug, log_debug_content};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;

/// Glyph that prefixes every rendered tool invocation; the relay flushes on sight of it.
pub const TOOL_MARKER: char = '⏺';

/// Tool output longer than this many lines is elided in the chat preview.
const TOOL_PREVIEW_LINES: usize = 5;

/// Receiver of decoded output.
pub trait DecoderSink {
    /// The terminal `result` event arrived; called before its text is emitted.
    fn finalize(&mut self);
    fn emit(&mut self, text: String);
}

/// Tool call whose JSON input is still streaming in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallAccumulator {
    pub name: String,
    pub id: String,
    fragments: Vec<String>,
}

impl ToolCallAccumulator {
    fn new(name: String, id: String) -> Self {
        Self {
            name,
            id,
            fragments: Vec::new(),
        }
    }

    fn push(&mut self, fragment: String) {
        self.fragments.push(fragment);
    }

    /// Parsed input, `{}` when nothing streamed, or the raw text when it is not valid JSON.
    pub fn input(&self) -> Value {
        let joined = self.fragments.concat();
        if joined.is_empty() {
            return Value::Object(Map::new());
        }
        serde_json::from_str(&joined).unwrap_or(Value::String(joined))
    }

    pub fn render(&self) -> String {
        format!(
            "\n{TOOL_MARKER} {}({})\n  ⎿ Running…\n",
            self.name,
            spaced_json(&self.input())
        )
    }
}

/// Single-line JSON with `", "` between items and `": "` after keys.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn spaced_json(value: &Value) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    if serde::Serialize::serialize(value, &mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

/// Per-invocation decoder state: open tool calls and the finalized flag.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    tools: HashMap<u64, ToolCallAccumulator>,
    finalized: bool,
    lines_decoded: u64,
    lines_dropped: u64,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn open_tool_calls(&self) -> usize {
        self.tools.len()
    }

    pub fn lines_decoded(&self) -> u64 {
        self.lines_decoded
    }

    pub fn lines_dropped(&self) -> u64 {
        self.lines_dropped
    }

    /// Decode one raw stdout line and apply it. Undecodable lines are counted and dropped.
    pub fn feed_line(&mut self, raw: &str, sink: &mut dyn DecoderSink) {
        match decode_line(raw) {
            Some(event) => {
                self.lines_decoded += 1;
                self.handle(event, sink);
            }
            None => {
                if !raw.trim().is_empty() {
                    self.lines_dropped += 1;
                    log_debug_content("StreamDecoder: dropped non-JSON line", raw);
                }
            }
        }
    }

    pub fn handle(&mut self, event: Event, sink: &mut dyn DecoderSink) {
        match event {
            Event::Result { text } => {
                log_debug("StreamDecoder: result event, output finalized");
                self.finalized = true;
                sink.finalize();
                if !text.is_empty() {
                    sink.emit(text);
                }
            }
            Event::ContentBlockStart {
                index,
                kind,
                name,
                id,
            } => {
                if kind == "tool_use" {
                    let name = name.unwrap_or_else(|| "Unknown".to_string());
                    self.tools
                        .insert(index, ToolCallAccumulator::new(name, id.unwrap_or_default()));
                }
            }
            Event::ContentBlockStop { index } => {
                if let Some(tool) = self.tools.remove(&index) {
                    log_debug(&format!(
                        "StreamDecoder: tool call {} ({}) complete",
                        tool.name, tool.id
                    ));
                    sink.emit(tool.render());
                }
            }
            Event::InputJsonDelta {
                index,
                partial_json,
            } => {
                if let Some(tool) = self.tools.get_mut(&index) {
                    tool.push(partial_json);
                }
            }
            Event::TextDelta { text, .. }
            | Event::ToolResultDelta { text }
            | Event::RawText { text } => sink.emit(text),
            Event::ToolResult { parts } => {
                for text in parts {
                    sink.emit(text);
                }
            }
            Event::UserToolResult { content } => {
                for output in content {
                    sink.emit(format!("\n{}\n", preview_tool_output(&output)));
                }
            }
            Event::Unrecognized => {}
        }
    }
}

/// Keep the first few lines of tool output and note how many were cut.
pub fn preview_tool_output(output: &str) -> String {
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() <= TOOL_PREVIEW_LINES {
        return output.to_string();
    }
    format!(
        "{}\n  … +{} lines",
        lines[..TOOL_PREVIEW_LINES].join("\n"),
        lines.len() - TOOL_PREVIEW_LINES
    )
}
