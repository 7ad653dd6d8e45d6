use super::{
    ChatClient, ChatDestination, ChatError, DeliveryMode, FileUpload, FlushScheduler,
    FlushSettings, OutputBuffer, Poster, RelayMessage,
};
use crossbeam_channel::unbounded;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingClient {
    posts: Mutex<Vec<String>>,
    uploads: Mutex<Vec<FileUpload>>,
    attempts: Mutex<usize>,
    fail_attempt: Option<usize>,
}

impl RecordingClient {
    fn failing_on(attempt: usize) -> Self {
        Self {
            fail_attempt: Some(attempt),
            ..Self::default()
        }
    }

    fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

impl ChatClient for RecordingClient {
    fn post_message(&self, _dest: &ChatDestination, text: &str) -> Result<(), ChatError> {
        let mut attempts = self.attempts.lock().unwrap();
        let attempt = *attempts;
        *attempts += 1;
        if self.fail_attempt == Some(attempt) {
            return Err(ChatError::Rejected("rate_limited".to_string()));
        }
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn upload_file(&self, _dest: &ChatDestination, upload: &FileUpload) -> Result<(), ChatError> {
        self.uploads.lock().unwrap().push(upload.clone());
        Ok(())
    }
}

fn poster(client: &Arc<RecordingClient>, max_chars: usize) -> Poster {
    let client: Arc<dyn ChatClient> = client.clone();
    Poster::new(
        client,
        ChatDestination::new("C1", "1700000000.000100"),
        max_chars,
        Duration::ZERO,
    )
}

fn buffer(mode: DeliveryMode, start: Instant) -> (Arc<RecordingClient>, OutputBuffer) {
    let client = Arc::new(RecordingClient::default());
    let buffer = OutputBuffer::new_at(
        poster(&client, 39_000),
        mode,
        FlushSettings::default(),
        start,
    );
    (client, buffer)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn crossing_threshold_flushes_exactly_once() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at(&"x".repeat(3899), t0);
    assert!(client.posts().is_empty());
    buffer.append_stdout_at("y", t0 + ms(10));
    buffer.append_stdout_at("z", t0 + ms(20));

    let posts = client.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0], format!("```\n{}y\n```", "x".repeat(3899)));
    assert_eq!(buffer.pending_chars(), 1);
}

#[test]
fn tool_marker_flushes_immediately() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at("thinking ", t0);
    buffer.append_stdout_at("\n⏺ Bash({})\n  ⎿ Running…\n", t0 + ms(5));
    assert_eq!(
        client.posts(),
        vec!["```\nthinking \n⏺ Bash({})\n  ⎿ Running…\n\n```".to_string()]
    );
}

#[test]
fn elapsed_window_flushes_both_appends_together() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at(&"a".repeat(100), t0);
    buffer.append_stdout_at(&"b".repeat(50), t0 + ms(1200));
    assert_eq!(
        client.posts(),
        vec![format!("```\n{}{}\n```", "a".repeat(100), "b".repeat(50))]
    );
}

#[test]
fn ticker_flushes_after_window() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at("slow", t0);
    buffer.tick_at(t0 + ms(500));
    assert!(client.posts().is_empty());
    buffer.tick_at(t0 + ms(1000));
    assert_eq!(client.posts(), vec!["```\nslow\n```".to_string()]);
    buffer.tick_at(t0 + ms(3000));
    assert_eq!(client.posts().len(), 1);
}

#[test]
fn quiet_mode_posts_progress_and_final_answer_only() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Quiet, t0);
    buffer.append_stdout_at("intermediate", t0 + ms(100));
    buffer.append_stdout_at("\n⏺ Bash({})\n", t0 + ms(200));
    buffer.tick_at(t0 + ms(5_000));
    buffer.tick_at(t0 + ms(10_000));
    buffer.tick_at(t0 + ms(15_000));
    buffer.tick_at(t0 + ms(70_000));
    buffer.mark_finalized();
    buffer.append_stdout_at("final answer", t0 + ms(71_000));
    buffer.tick_at(t0 + ms(200_000));
    buffer.flush();

    assert_eq!(
        client.posts(),
        vec![
            "Running... (elapsed: 10s)".to_string(),
            "Running... (elapsed: 1m 10s)".to_string(),
            "final answer".to_string(),
        ]
    );
}

#[test]
fn finalized_output_flushes_pending_then_posts_unwrapped() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at("partial", t0);
    buffer.mark_finalized();
    assert!(buffer.is_finalized());
    buffer.append_stdout_at("answer", t0 + ms(10));
    assert_eq!(
        client.posts(),
        vec!["```\npartial\n```".to_string(), "answer".to_string()]
    );
}

#[test]
fn tick_after_finalize_cannot_post_streamed_text_unwrapped() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at("partial", t0);
    buffer.mark_finalized();
    buffer.tick_at(t0 + ms(60_000));
    buffer.append_stdout_at("answer", t0 + ms(60_010));
    buffer.flush();
    assert_eq!(
        client.posts(),
        vec!["```\npartial\n```".to_string(), "answer".to_string()]
    );
}

#[test]
fn stderr_goes_out_at_once_when_nothing_pending() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Quiet, t0);
    buffer.append_stderr_at("[ERROR] SpawnError: not found\n", t0);
    assert_eq!(
        client.posts(),
        vec!["[STDERR]\n[ERROR] SpawnError: not found\n".to_string()]
    );
}

#[test]
fn stderr_waits_for_open_window() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at("out", t0);
    buffer.append_stderr_at("warn\n", t0 + ms(100));
    assert!(client.posts().is_empty());
    buffer.tick_at(t0 + ms(1000));
    assert_eq!(
        client.posts(),
        vec!["```\nout\n```".to_string(), "[STDERR]\nwarn\n".to_string()]
    );
}

#[test]
fn clear_discards_pending_output() {
    let t0 = Instant::now();
    let (client, buffer) = buffer(DeliveryMode::Incremental, t0);
    buffer.append_stdout_at("never posted", t0);
    buffer.clear();
    buffer.flush();
    assert!(client.posts().is_empty());
    assert_eq!(buffer.pending_chars(), 0);
}

#[test]
fn poster_splits_long_text_in_order() {
    let client = Arc::new(RecordingClient::default());
    let poster = poster(&client, 10);
    let text: String = ('a'..='y').collect();
    assert_eq!(poster.post(&text, false), 3);
    assert_eq!(
        client.posts(),
        vec![
            "abcdefghij".to_string(),
            "klmnopqrst".to_string(),
            "uvwxy".to_string()
        ]
    );
}

#[test]
fn poster_continues_after_failed_chunk() {
    let client = Arc::new(RecordingClient::failing_on(1));
    let poster = poster(&client, 2);
    assert_eq!(poster.post("aabbcc", false), 2);
    assert_eq!(client.posts(), vec!["aa".to_string(), "cc".to_string()]);
}

#[test]
fn poster_sanitizes_and_wraps() {
    let client = Arc::new(RecordingClient::default());
    let poster = poster(&client, 39_000);
    poster.post("\x1b[32mok\x1b[0m\r\n", true);
    poster.post("   ", true);
    poster.post("", false);
    assert_eq!(
        client.posts(),
        vec!["```\nok\n\n```".to_string(), "   ".to_string()]
    );
}

#[test]
fn poster_forwards_uploads() {
    let client = Arc::new(RecordingClient::default());
    let poster = poster(&client, 39_000);
    let upload = FileUpload {
        path: "/tmp/shot.png".into(),
        filename: "screenshot_main.rs.png".to_string(),
        title: "Screenshot: src/main.rs".to_string(),
        comment: "<@U1> captured".to_string(),
    };
    poster.upload(&upload).expect("upload");
    assert_eq!(client.uploads.lock().unwrap().as_slice(), &[upload]);
}

#[test]
fn scheduler_applies_messages_in_order_and_stops_idempotently() {
    let client = Arc::new(RecordingClient::default());
    let buffer = Arc::new(OutputBuffer::new(
        poster(&client, 39_000),
        DeliveryMode::Incremental,
        FlushSettings::default(),
    ));
    let (tx, rx) = unbounded();
    let mut scheduler = FlushScheduler::spawn(Arc::clone(&buffer), rx, ms(10));
    tx.send(RelayMessage::Text("working".to_string())).unwrap();
    tx.send(RelayMessage::Finalized).unwrap();
    tx.send(RelayMessage::Text("done".to_string())).unwrap();
    drop(tx);
    scheduler.stop();
    scheduler.stop();

    assert!(buffer.is_finalized());
    assert_eq!(
        client.posts(),
        vec!["```\nworking\n```".to_string(), "done".to_string()]
    );
}

#[cfg(unix)]
mod invocation {
    use super::{poster, RecordingClient};
    use crate::claude::{Supervisor, SupervisorConfig};
    use crate::registry::ProcessRegistry;
    use crate::relay::{
        run_invocation, DeliveryMode, InvocationContext, InvocationOutcome, InvocationSpec,
        RelayConfig,
    };
    use crate::session::{ConversationId, SessionFlag};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn context(dir: &Path, body: &str) -> InvocationContext {
        let script = dir.join("fake-claude");
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        let config = SupervisorConfig {
            claude_cmd: script.to_string_lossy().to_string(),
            path_prefixes: Vec::new(),
            strip_env: Vec::new(),
            ..SupervisorConfig::default()
        };
        let relay = RelayConfig {
            post_pacing: Duration::ZERO,
            ..RelayConfig::default()
        };
        InvocationContext {
            supervisor: Arc::new(Supervisor::new(config, Arc::new(ProcessRegistry::new()))),
            relay,
        }
    }

    fn spec(client: &Arc<RecordingClient>, conversation: &str, mode: DeliveryMode) -> InvocationSpec {
        InvocationSpec {
            conversation: ConversationId::new(conversation),
            prompt: "hello".to_string(),
            user: "U1".to_string(),
            mode,
            poster: poster(client, 39_000),
        }
    }

    #[test]
    fn quiet_success_posts_answer_and_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(
            dir.path(),
            r#"echo '{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"thinking"}}'
echo '{"type":"result","result":"all done"}'"#,
        );
        let client = Arc::new(RecordingClient::default());

        let outcome = run_invocation(&ctx, spec(&client, "t-ok", DeliveryMode::Quiet));

        assert_eq!(outcome, InvocationOutcome::Completed { exit_code: 0 });
        assert_eq!(
            client.posts(),
            vec!["all done".to_string(), "<@U1> Done!".to_string()]
        );
        let conv = ConversationId::new("t-ok");
        assert_eq!(
            ctx.supervisor.registry().session_flag(&conv),
            SessionFlag::Resume(conv.session_id())
        );
    }

    #[test]
    fn failing_process_reports_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), "exit 2");
        let client = Arc::new(RecordingClient::default());

        let outcome = run_invocation(&ctx, spec(&client, "t-fail", DeliveryMode::Incremental));

        assert_eq!(outcome, InvocationOutcome::Completed { exit_code: 2 });
        assert_eq!(
            client.posts(),
            vec!["<@U1> Error occurred (code=2)".to_string()]
        );
        let conv = ConversationId::new("t-fail");
        assert!(matches!(
            ctx.supervisor.registry().session_flag(&conv),
            SessionFlag::Create(_)
        ));
    }

    #[test]
    fn stopped_invocation_posts_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(
            dir.path(),
            r#"echo '{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}'
exec sleep 30"#,
        );
        ctx.relay.flush.interval = Duration::from_secs(60);
        let client = Arc::new(RecordingClient::default());
        let registry = Arc::clone(ctx.supervisor.registry());
        let conv = ConversationId::new("t-stop");

        let runner = {
            let ctx = ctx.clone();
            let spec = spec(&client, "t-stop", DeliveryMode::Incremental);
            thread::spawn(move || run_invocation(&ctx, spec))
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.running_pid(&conv).is_none() {
            assert!(Instant::now() < deadline, "process never registered");
            thread::sleep(Duration::from_millis(20));
        }
        assert!(registry.stop(&conv).is_some());

        assert_eq!(
            runner.join().expect("runner"),
            InvocationOutcome::Cancelled
        );
        assert!(client.posts().is_empty());
        assert_eq!(registry.active_count(), 0);
    }
}
