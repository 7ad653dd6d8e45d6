use crate::relay::{
    run_invocation, ChatDestination, DeliveryMode, FileUpload, InvocationOutcome, InvocationSpec,
    Poster,
};
use crate::session::ConversationId;
use crate::{log_debug, log_debug_content};
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use super::session::IpcState;

const EMPTY_PROMPT_HELP: &str = "The prompt is empty. Send it as `@Bot <prompt>`.";
const SCREENSHOT_USAGE: &str =
    "Usage:\n`@Bot screenshot <file_path>`\n`@Bot screenshot <file_path> --line 10`";

// ============================================================================
// Mention Parsing
// ============================================================================

/// A mention of the bot, as forwarded by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Mention {
    pub(super) channel: String,
    pub(super) thread_ts: Option<String>,
    pub(super) ts: String,
    pub(super) user: String,
    pub(super) text: String,
}

impl Mention {
    /// Replies to a reply stay in its thread; a top-level mention starts one.
    pub(super) fn conversation(&self) -> ConversationId {
        ConversationId::new(self.thread_ts.as_deref().unwrap_or(&self.ts))
    }

    pub(super) fn destination(&self) -> ChatDestination {
        ChatDestination::new(self.channel.clone(), self.conversation().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum MentionAction {
    Status,
    Stop,
    ScreenshotUsage,
    Screenshot { path: String, line: Option<u32> },
    EmptyPrompt,
    Prompt { prompt: String, mode: DeliveryMode },
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@[^>]+>\s*").expect("valid mention regex"))
}

fn line_flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--line\s+(\d+)").expect("valid line regex"))
}

/// Strip a leading keyword (case-insensitive) followed by whitespace or the end of text.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

pub(super) fn parse_mention(text: &str) -> MentionAction {
    let stripped = mention_re().replace_all(text, "");
    let mut prompt = stripped.trim();

    let mut mode = DeliveryMode::Quiet;
    if let Some(rest) = strip_keyword(prompt, "stream") {
        mode = DeliveryMode::Incremental;
        prompt = rest;
    }

    if prompt.eq_ignore_ascii_case("status") {
        return MentionAction::Status;
    }
    if prompt.eq_ignore_ascii_case("stop") {
        return MentionAction::Stop;
    }
    if let Some(args) = strip_keyword(prompt, "screenshot") {
        return parse_screenshot_args(args);
    }
    if prompt.is_empty() {
        return MentionAction::EmptyPrompt;
    }
    MentionAction::Prompt {
        prompt: prompt.to_string(),
        mode,
    }
}

fn parse_screenshot_args(args: &str) -> MentionAction {
    let (path, line) = match line_flag_re().captures(args) {
        Some(caps) => {
            let Some(line) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                return MentionAction::ScreenshotUsage;
            };
            let start = caps.get(0).map_or(0, |m| m.start());
            (args[..start].trim(), Some(line))
        }
        None => (args.trim(), None),
    };
    if path.is_empty() {
        return MentionAction::ScreenshotUsage;
    }
    MentionAction::Screenshot {
        path: path.to_string(),
        line,
    }
}

// ============================================================================
// Mention Handlers
// ============================================================================

pub(super) fn handle_mention(state: &mut IpcState, mention: Mention) {
    log_debug_content(
        &format!("IPC mention in {}", mention.conversation()),
        &mention.text,
    );
    let poster = state.poster_for(&mention);
    let conversation = mention.conversation();
    let user = mention.user.as_str();

    match parse_mention(&mention.text) {
        MentionAction::Status => handle_status(state, &poster, &conversation, user),
        MentionAction::Stop => handle_stop(state, &poster, &conversation, user),
        MentionAction::ScreenshotUsage => {
            poster.post(SCREENSHOT_USAGE, false);
        }
        MentionAction::Screenshot { path, line } => {
            handle_screenshot(state, poster, user.to_string(), path, line)
        }
        MentionAction::EmptyPrompt => {
            poster.post(EMPTY_PROMPT_HELP, false);
        }
        MentionAction::Prompt { prompt, mode } => {
            start_invocation(state, poster, conversation, user.to_string(), prompt, mode)
        }
    }
}

fn handle_status(state: &IpcState, poster: &Poster, conversation: &ConversationId, user: &str) {
    let registry = state.registry();
    let text = match registry.running_pid(conversation) {
        Some(pid) => format!("<@{user}> Running (PID: {pid})"),
        None if registry.is_reserved(conversation) => format!("<@{user}> Starting..."),
        None => format!("<@{user}> No process is running."),
    };
    poster.post(&text, false);
}

fn handle_stop(state: &IpcState, poster: &Poster, conversation: &ConversationId, user: &str) {
    let text = match state.registry().stop(conversation) {
        Some(_) => format!("<@{user}> Stopped the Claude process."),
        None => format!("<@{user}> No process is running in this thread."),
    };
    poster.post(&text, false);
}

fn handle_screenshot(
    state: &mut IpcState,
    poster: Poster,
    user: String,
    path: String,
    line: Option<u32>,
) {
    let mut notice = format!("Taking a screenshot: {path}");
    if let Some(line) = line {
        notice.push_str(&format!(" (from line {line})"));
    }
    poster.post(&notice, false);

    let capture = Arc::clone(&state.screenshot);
    state.spawn_worker(move || match capture.capture(Path::new(&path), line) {
        Ok(image) => {
            let basename = Path::new(&path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());
            let upload = FileUpload {
                path: image,
                filename: format!("screenshot_{basename}.png"),
                title: format!("Screenshot: {path}"),
                comment: format!("<@{user}> Captured {path}"),
            };
            if let Err(err) = poster.upload(&upload) {
                log_debug(&format!("Screenshot upload failed: {err}"));
                poster.post(
                    &format!("<@{user}> Failed to upload the screenshot: {err}"),
                    false,
                );
            }
        }
        Err(err) => {
            log_debug(&format!("Screenshot of {path} failed: {err}"));
            poster.post(&format!("<@{user}> {err}"), false);
        }
    });
}

fn start_invocation(
    state: &mut IpcState,
    poster: Poster,
    conversation: ConversationId,
    user: String,
    prompt: String,
    mode: DeliveryMode,
) {
    let registry = Arc::clone(state.registry());
    let Some(reservation) = registry.try_reserve(&conversation) else {
        let busy = match registry.running_pid(&conversation) {
            Some(pid) => format!(
                "<@{user}> A process is already running in this thread (PID: {pid}). Send `stop` first."
            ),
            None => format!(
                "<@{user}> A process is already running in this thread. Send `stop` first."
            ),
        };
        poster.post(&busy, false);
        return;
    };

    poster.post("Starting!", false);
    let ctx = state.ctx.clone();
    let spec = InvocationSpec {
        conversation,
        prompt,
        user,
        mode,
        poster,
    };
    state.spawn_worker(move || {
        let _reservation = reservation;
        let conversation = spec.conversation.clone();
        match run_invocation(&ctx, spec) {
            InvocationOutcome::Completed { exit_code } => log_debug(&format!(
                "Invocation for {conversation} finished with code {exit_code}"
            )),
            InvocationOutcome::Cancelled => {
                log_debug(&format!("Invocation for {conversation} was cancelled"))
            }
        }
    });
}
