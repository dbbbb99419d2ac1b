//! Accept loop timing, run on a paused clock so delays are exact.

use std::time::Duration;

use demon_ring::Server;
use tokio::time::Instant;

mod common;

use common::{GatedHandler, ScriptedListener, Step};

fn gaps(times: &[Instant]) -> Vec<Duration> {
    times.windows(2).map(|w| w[1] - w[0]).collect()
}

fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(1),
        "expected {expected:?}, got {actual:?}"
    );
}

fn opened_handler() -> GatedHandler {
    let handler = GatedHandler::new();
    handler.open();
    handler
}

#[tokio::test(start_paused = true)]
async fn temporary_failures_back_off_exponentially_up_to_one_second() {
    let server = Server::new(opened_handler(), []);
    let listener = ScriptedListener::new([Step::Temporary; 12]);
    let serving = tokio::spawn({
        let server = server.clone();
        let listener = listener.clone();
        async move { server.serve(listener).await }
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    let times = listener.accept_times();
    assert_eq!(times.len(), 13);

    let expected_ms = [5, 10, 20, 40, 80, 160, 320, 640, 1000, 1000, 1000, 1000];
    for (gap, ms) in gaps(&times).into_iter().zip(expected_ms) {
        assert_close(gap, Duration::from_millis(ms));
    }

    server.stop();
    serving.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn successful_accept_resets_backoff() {
    let handler = opened_handler();
    let server = Server::new(handler.clone(), []);
    let listener = ScriptedListener::new([
        Step::Temporary,
        Step::Temporary,
        Step::Temporary,
        Step::Conn,
        Step::Temporary,
    ]);
    let serving = tokio::spawn({
        let server = server.clone();
        let listener = listener.clone();
        async move { server.serve(listener).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    let times = listener.accept_times();
    assert_eq!(times.len(), 6);

    let gaps = gaps(&times);
    assert_close(gaps[0], Duration::from_millis(5));
    assert_close(gaps[1], Duration::from_millis(10));
    assert_close(gaps[2], Duration::from_millis(20));
    // The connection is accepted and the next accept follows at once.
    assert_close(gaps[3], Duration::ZERO);
    // The failure after the success starts over at 5ms.
    assert_close(gaps[4], Duration::from_millis(5));
    assert_eq!(handler.started(), 1);

    server.graceful_stop().await;
    serving.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_capped_backoff_sleep() {
    let server = Server::new(opened_handler(), []);
    let listener = ScriptedListener::always_temporary();
    let serving = tokio::spawn({
        let server = server.clone();
        let listener = listener.clone();
        async move { server.serve(listener).await }
    });

    // Well past the cap: the loop is now sleeping 1s between attempts.
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let attempts = listener.accept_count();

    let stopped_at = Instant::now();
    server.stop();
    serving.await.unwrap().unwrap();

    assert!(Instant::now() - stopped_at < Duration::from_secs(1));
    assert_eq!(listener.accept_count(), attempts);
    assert_eq!(listener.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn graceful_stop_interrupts_backoff_sleep() {
    let server = Server::new(opened_handler(), []);
    let listener = ScriptedListener::always_temporary();
    let serving = tokio::spawn({
        let server = server.clone();
        let listener = listener.clone();
        async move { server.serve(listener).await }
    });

    tokio::time::sleep(Duration::from_millis(2_000)).await;

    let stopped_at = Instant::now();
    server.graceful_stop().await;
    assert!(Instant::now() - stopped_at < Duration::from_secs(1));
    serving.await.unwrap().unwrap();
    assert_eq!(listener.close_count(), 1);
}
