//! Integration tests for looper threads and the process-wide default handler.

use crossbeam_channel::bounded;
use prometheus_weak_handler::builders::{build_default_handler, HandlerBuilder};
use prometheus_weak_handler::config::LooperConfig;
use prometheus_weak_handler::core::{Message, MessageHandler, Task};
use prometheus_weak_handler::infra::LooperThread;
use prometheus_weak_handler::runtime::{default_handler, post, post_delayed};
use prometheus_weak_handler::util::init_tracing;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// LOOPER THREAD
// ============================================================================

#[test]
fn test_tasks_run_on_looper_thread() {
    init_tracing();
    let config = LooperConfig::default().with_name("looper-it");
    let (looper, handler) = build_default_handler(&config).unwrap();

    let (tx, rx) = bounded(1);
    let task = Task::new(move || {
        let _ = tx.send(thread::current().name().map(str::to_owned));
    });
    assert!(handler.post(&task));
    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("looper-it"));

    looper.shutdown();
}

#[test]
fn test_delayed_post_waits_on_real_clock() {
    init_tracing();
    let (looper, handler) = build_default_handler(&LooperConfig::default()).unwrap();

    let (tx, rx) = bounded(1);
    let task = Task::new(move || {
        let _ = tx.send(Instant::now());
    });
    let start = Instant::now();
    assert!(handler.post_delayed(&task, Duration::from_millis(50)));

    let fired = rx.recv_timeout(WAIT).unwrap();
    assert!(fired.duration_since(start) >= Duration::from_millis(40));
    assert_eq!(handler.pending_callbacks(), 0);

    looper.shutdown();
}

#[test]
fn test_shutdown_discards_pending_and_refuses() {
    init_tracing();
    let (looper, handler) = build_default_handler(&LooperConfig::default()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let task = Task::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(handler.post_delayed(&task, Duration::from_secs(60)));
    looper.shutdown();
    looper.shutdown();

    assert!(looper.is_shut_down());
    assert_eq!(handler.pending_callbacks(), 0);
    assert!(!handler.post(&task));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_drop_without_shutdown_stops_accepting() {
    init_tracing();
    let looper = LooperThread::spawn(&LooperConfig::default()).unwrap();
    let queue = looper.host_queue();
    let handler = HandlerBuilder::new(queue).build();
    drop(looper);

    assert!(!handler.send_empty_message(1));
}

#[test]
fn test_messages_delivered_on_looper_thread() {
    struct Forward(crossbeam_channel::Sender<i32>);

    impl MessageHandler for Forward {
        fn handle_message(&self, message: &Message) {
            let _ = self.0.send(message.what);
        }
    }

    init_tracing();
    let looper = LooperThread::spawn(&LooperConfig::default()).unwrap();
    let (tx, rx) = bounded(4);
    let forward = Arc::new(Forward(tx));
    let handler = HandlerBuilder::new(looper.host_queue())
        .callback(&forward)
        .build();

    assert!(handler.send_empty_message(1));
    assert!(handler.send_empty_message_delayed(2, Duration::from_millis(10)));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);

    looper.shutdown();
}

// ============================================================================
// DEFAULT INSTANCE
// ============================================================================

#[test]
fn test_default_handler_is_a_singleton() {
    init_tracing();
    let first = default_handler().unwrap();
    let second = default_handler().unwrap();
    assert!(std::ptr::eq(first, second));
}

#[test]
fn test_free_post_runs_while_owner_alive() {
    init_tracing();
    let (tx, rx) = bounded(1);
    let owner = Arc::new(tx);

    assert!(post(&owner, |tx| {
        let _ = tx.send(7);
    }));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
}

#[test]
fn test_free_post_delayed_skips_released_owner() {
    init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    let owner = Arc::new(Arc::clone(&hits));
    assert!(post_delayed(&owner, Duration::from_millis(20), |hits| {
        hits.fetch_add(1, Ordering::SeqCst);
    }));
    drop(owner);

    let (tx, rx) = bounded(1);
    let marker = Arc::new(tx);
    assert!(post_delayed(&marker, Duration::from_millis(40), |tx| {
        let _ = tx.send(());
    }));
    rx.recv_timeout(WAIT).unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
