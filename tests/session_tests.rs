//! Engine tests against scripted and in-memory transports

use expectkit::transport::scripted::Script;
use expectkit::transport::{Input, Output, StreamControl};
use expectkit::{
    Batcher, Case, ExpectError, Expecter, Pattern, RetentionPolicy, Session, SessionBuilder,
    Signal, SpawnSource, Transport, ZERO_WAIT,
};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};

fn builder() -> SessionBuilder {
    Session::builder().timeout(Duration::from_secs(5))
}

async fn scripted(script: Script) -> Session {
    builder()
        .spawn_scripted(script)
        .await
        .expect("Failed to attach scripted session")
}

/// Wait until `text` shows up without consuming it.
async fn settle(session: &Session, text: &str) {
    session
        .expect(&Pattern::exact(text))
        .await
        .expect("Output never arrived");
}

#[tokio::test]
async fn test_timeout_is_never_early() {
    let session = scripted(Script::new().emit("nothing useful")).await;
    let timeout = Duration::from_millis(200);

    let started = Instant::now();
    let err = session
        .expect_timeout(&Pattern::exact("absent"), timeout)
        .await
        .unwrap_err();

    assert!(matches!(err, ExpectError::Timeout { duration } if duration == timeout));
    assert!(started.elapsed() >= timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_zero_wait_returns_immediately() {
    let session = scripted(Script::new()).await;

    let started = Instant::now();
    let result = session
        .expect_timeout(&Pattern::exact("absent"), ZERO_WAIT)
        .await
        .expect("Zero wait should not fail on an open session");

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(result.matched, "");
    assert!(result.groups.is_empty());
}

#[tokio::test]
async fn test_zero_wait_reports_current_match() {
    let session = scripted(Script::new().emit("version 4.2\n")).await;
    settle(&session, "\n").await;

    let result = session
        .expect_timeout(&Pattern::regex(r"version (\d+)\.(\d+)").unwrap(), ZERO_WAIT)
        .await
        .unwrap();
    assert_eq!(result.groups, vec!["4", "2"]);
    assert_eq!(result.output, "version 4.2\n");
}

#[tokio::test]
async fn test_digits_without_and_with_group() {
    let session = scripted(Script::new().emit("abc123")).await;

    let plain = session
        .expect(&Pattern::regex(r"\d+").unwrap())
        .await
        .unwrap();
    assert_eq!(plain.matched, "123");
    assert!(plain.groups.is_empty());
    assert_eq!(plain.before, "abc");

    let grouped = session
        .expect(&Pattern::regex(r"(\d+)").unwrap())
        .await
        .unwrap();
    assert_eq!(grouped.matched, "123");
    assert_eq!(grouped.groups, vec!["123"]);
}

#[tokio::test]
async fn test_output_split_across_emits_matches() {
    let session = scripted(
        Script::new()
            .emit("pass")
            .delay(Duration::from_millis(20))
            .emit("word: "),
    )
    .await;

    let result = session.expect(&Pattern::exact("password: ")).await.unwrap();
    assert_eq!((result.start, result.end), (0, 10));
}

#[tokio::test]
async fn test_switch_prefers_declaration_order() {
    let session = scripted(Script::new().emit("foo")).await;
    settle(&session, "foo").await;

    let cases = [
        Case::new(Pattern::regex("foo").unwrap()).respond("A"),
        Case::new(Pattern::regex(".*").unwrap()).respond("B"),
    ];
    let result = session.expect_switch(&cases).await.unwrap();
    assert_eq!(result.pattern_index, 0);
    assert_eq!(result.matched, "foo");
}

#[tokio::test]
async fn test_switch_response_uses_groups() {
    let session = scripted(
        Script::new()
            .emit("user bob logged in\n")
            .expect_input(Pattern::exact("hello bob\n"))
            .emit("greeted\n"),
    )
    .await;

    let cases = [Case::new(Pattern::regex(r"user (\w+)").unwrap()).respond("hello \\1\n")];
    session.expect_switch(&cases).await.unwrap();
    session.expect(&Pattern::exact("greeted")).await.unwrap();
}

#[tokio::test]
async fn test_switch_continue_after_match() {
    let session = scripted(
        Script::new()
            .emit("more? ")
            .expect_input(Pattern::exact("y\n"))
            .emit("more? ")
            .expect_input(Pattern::exact("y\n"))
            .emit("done\n$ "),
    )
    .await;

    let cases = [
        Case::new(Pattern::exact("more? "))
            .respond("y\n")
            .continue_after_match(5),
        Case::new(Pattern::regex(r"\$ $").unwrap()),
    ];
    let result = session.expect_switch(&cases).await.unwrap();
    assert_eq!(result.pattern_index, 1);
    assert!(result.before.contains("done"));
}

#[tokio::test]
async fn test_switch_continue_limit_ends_switch() {
    let session = scripted(Script::new().emit("again again again")).await;
    settle(&session, "again again again").await;

    let cases = [Case::new(Pattern::exact("again")).continue_after_match(1)];
    let result = session.expect_switch(&cases).await.unwrap();
    assert_eq!(result.start, 6);
}

#[tokio::test]
async fn test_switch_failure_case() {
    let session = scripted(Script::new().emit("Permission denied")).await;

    let cases = [
        Case::new(Pattern::exact("$ ")),
        Case::new(Pattern::exact("denied")).fail("bad password"),
    ];
    let err = session.expect_switch(&cases).await.unwrap_err();
    assert!(matches!(
        err,
        ExpectError::CaseFailed { index: 1, ref message } if message == "bad password"
    ));
}

#[tokio::test]
async fn test_switch_argument_errors() {
    let session = scripted(Script::new()).await;

    assert!(matches!(
        session.expect_switch(&[]).await,
        Err(ExpectError::InvalidArgument(_))
    ));
    assert!(matches!(
        session
            .expect_switch_timeout(&[Case::new(Pattern::exact("x"))], ZERO_WAIT)
            .await,
        Err(ExpectError::Timeout { duration }) if duration.is_zero()
    ));
}

#[tokio::test]
async fn test_invalid_pattern_fails_before_waiting() {
    let session = scripted(Script::new()).await;

    let started = Instant::now();
    let err = session
        .expect_timeout(&Pattern::exact(""), Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, ExpectError::InvalidPattern(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_batch_ping_pong() {
    let session = scripted(
        Script::new()
            .expect_input(Pattern::exact("ping"))
            .emit("pong"),
    )
    .await;

    let results = session
        .expect_batch(&[
            Batcher::send("ping"),
            Batcher::expect_timeout(Pattern::exact("pong"), Duration::from_secs(1)),
            Batcher::send("bye"),
        ])
        .await
        .expect("Batch should succeed");

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(
        results.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(results[1].matched, "pong");
    assert_eq!(results[0].matched, "");
}

#[tokio::test]
async fn test_batch_stops_at_first_failure() {
    let session = scripted(
        Script::new()
            .expect_input(Pattern::exact("y"))
            .emit("GOT-Y"),
    )
    .await;

    let failure = session
        .expect_batch(&[
            Batcher::expect_timeout(Pattern::exact("X"), Duration::from_millis(300)),
            Batcher::send("y"),
        ])
        .await
        .unwrap_err();

    assert_eq!(failure.results.len(), 1);
    assert!(failure.error.is_timeout());
    assert!(matches!(
        failure.results[0].error,
        Some(ExpectError::Timeout { .. })
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.output().contains("GOT-Y"));
}

#[tokio::test]
async fn test_batch_switch_records_case() {
    let session = scripted(Script::new().emit("login: ")).await;

    let results = session
        .expect_batch(&[Batcher::switch(vec![
            Case::new(Pattern::exact("Password:")),
            Case::new(Pattern::exact("login: ")),
        ])])
        .await
        .unwrap();
    assert_eq!(results[0].case_index, Some(1));
}

#[tokio::test]
async fn test_batch_signal_on_stream_fails() {
    let session = scripted(Script::new()).await;

    let failure = session
        .expect_batch(&[Batcher::send("x"), Batcher::signal(Signal::Interrupt)])
        .await
        .unwrap_err();
    assert_eq!(failure.results.len(), 2);
    assert!(matches!(failure.error, ExpectError::Unsupported(_)));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let session = scripted(Script::new()).await;
    tokio_test::assert_ok!(session.close().await);
    tokio_test::assert_ok!(session.close().await);
    assert!(session.is_closed());
    assert!(matches!(
        session.send(b"late").await,
        Err(ExpectError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_close_interrupts_inflight_match() {
    let session = scripted(Script::new()).await;
    let never = Pattern::exact("never");

    let (matched, closed) = tokio::join!(
        session.expect_timeout(&never, Duration::from_secs(10)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.close().await
        }
    );

    assert!(matches!(matched, Err(ExpectError::SessionClosed)));
    tokio_test::assert_ok!(closed);
}

#[tokio::test]
async fn test_matches_on_closed_session_fail() {
    let session = scripted(Script::new().emit("ready")).await;
    settle(&session, "ready").await;
    session.close().await.unwrap();

    assert!(matches!(
        session.expect_timeout(&Pattern::exact("ready"), ZERO_WAIT).await,
        Err(ExpectError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_end_of_output_after_buffered_match() {
    let session = scripted(Script::new().emit("last words").exit()).await;
    tokio_test::assert_ok!(session.wait().await);
    assert!(session.is_finished());

    let result = session.expect(&Pattern::exact("words")).await.unwrap();
    assert_eq!(result.matched, "words");

    let err = session.expect(&Pattern::exact("more")).await.unwrap_err();
    assert!(matches!(err, ExpectError::SessionClosed));
}

#[tokio::test]
async fn test_signal_on_stream_transport_is_unsupported() {
    let (engine, mut far) = tokio::io::duplex(1024);
    let (reader, writer) = tokio::io::split(engine);
    let session = builder()
        .spawn_generic(Transport::stream(reader, writer))
        .await
        .unwrap();

    tokio::io::AsyncWriteExt::write_all(&mut far, b"hello")
        .await
        .unwrap();
    settle(&session, "hello").await;

    let err = session.send_signal(Signal::Terminate).await.unwrap_err();
    assert!(matches!(err, ExpectError::Unsupported(_)));
    assert_eq!(session.output(), "hello");
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
    }
}

#[tokio::test]
async fn test_read_failure_is_terminal() {
    let transport = Transport::new(
        Output::Async(Box::new(BrokenReader)),
        Input::Async(Box::new(tokio::io::sink())),
        Arc::new(StreamControl),
    );
    let session = builder().spawn_generic(transport).await.unwrap();

    assert!(matches!(session.wait().await, Err(ExpectError::ReadFailed(_))));
    assert!(matches!(
        session.expect(&Pattern::exact("x")).await,
        Err(ExpectError::ReadFailed(_))
    ));
}

#[tokio::test]
async fn test_retain_all_repeats_first_occurrence() {
    let session = scripted(Script::new().emit("$ one\n$ two\n")).await;
    settle(&session, "two\n").await;

    let first = session.expect(&Pattern::exact("$ ")).await.unwrap();
    let second = session.expect(&Pattern::exact("$ ")).await.unwrap();
    assert_eq!(first.start, 0);
    assert_eq!(second.start, 0);
}

#[tokio::test]
async fn test_consume_matched_advances() {
    let session = builder()
        .retention(RetentionPolicy::ConsumeMatched)
        .spawn_scripted(Script::new().emit("$ one\n$ two\n"))
        .await
        .unwrap();

    let first = session.expect(&Pattern::exact("$ ")).await.unwrap();
    let second = session.expect(&Pattern::exact("$ ")).await.unwrap();
    assert_eq!(first.start, 0);
    assert_eq!(second.start, 6);
    assert_eq!(second.before, "one\n");
}

#[tokio::test]
async fn test_strip_ansi() {
    let session = builder()
        .strip_ansi(true)
        .spawn_scripted(Script::new().emit("\x1b[1;32mOK\x1b[0m done"))
        .await
        .unwrap();

    session.expect(&Pattern::exact("done")).await.unwrap();
    assert_eq!(session.output(), "OK done");
}

#[tokio::test]
async fn test_clear_buffer() {
    let session = scripted(
        Script::new()
            .emit("old")
            .expect_input(Pattern::exact("go"))
            .emit("new"),
    )
    .await;
    settle(&session, "old").await;

    session.clear_buffer();
    assert_eq!(session.output(), "");

    session.send(b"go").await.unwrap();
    let result = session.expect(&Pattern::exact("new")).await.unwrap();
    assert_eq!(result.start, 0);
}

#[tokio::test]
async fn test_send_line_appends_newline() {
    let session = scripted(
        Script::new()
            .expect_input(Pattern::exact("status\n"))
            .emit("up"),
    )
    .await;

    session.send_line("status").await.unwrap();
    session.expect(&Pattern::exact("up")).await.unwrap();
}

#[tokio::test]
async fn test_expecter_reattach_replaces_session() {
    let mut expecter = Expecter::new(builder());
    expecter
        .attach(SpawnSource::scripted(Script::new().emit("first")))
        .await
        .unwrap();
    expecter.expect(&Pattern::exact("first")).await.unwrap();

    expecter
        .attach(SpawnSource::scripted(Script::new().emit("second")))
        .await
        .unwrap();
    expecter.expect(&Pattern::exact("second")).await.unwrap();
    let output = expecter.session().unwrap().output();
    assert!(!output.contains("first"));

    expecter.close().await.unwrap();
    assert!(matches!(
        expecter.expect(&Pattern::exact("second")).await,
        Err(ExpectError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_session_shared_between_tasks() {
    let session = Arc::new(
        scripted(
            Script::new()
                .expect_input(Pattern::exact("go"))
                .emit("went"),
        )
        .await,
    );

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.expect(&Pattern::exact("went")).await })
    };
    session.send(b"go").await.unwrap();

    let result = waiter.await.unwrap().unwrap();
    assert_eq!(result.matched, "went");
}

#[test]
fn test_matchers_usable_directly() {
    use expectkit::{ExactMatcher, Matcher, RegexMatcher};

    let exact = ExactMatcher::new("ok").unwrap();
    assert_eq!(exact.literal(), b"ok");
    assert_eq!(exact.find(b"is ok").map(|m| m.start), Some(3));

    let regex = RegexMatcher::new(r"v(\d+)").unwrap();
    assert_eq!(regex.as_str(), r"v(\d+)");
    assert!(regex.find(b"v12").is_some());
}


#[tokio::test]
async fn test_expecter_forwards_full_api() {
    let mut expecter = Expecter::new(builder());
    expecter
        .attach(SpawnSource::scripted(
            Script::new()
                .expect_input(Pattern::exact("hello\n"))
                .emit("menu> ")
                .expect_input(Pattern::exact("1"))
                .emit("picked one"),
        ))
        .await
        .unwrap();

    expecter.send_line("hello").await.unwrap();
    let cases = [Case::new(Pattern::exact("menu> ")).respond("1")];
    let matched = expecter
        .expect_switch_timeout(&cases, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(matched.pattern_index, 0);

    let results = expecter
        .expect_batch_timeout(
            &[Batcher::expect(Pattern::exact("picked one"))],
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(results[0].matched, "picked one");
}
