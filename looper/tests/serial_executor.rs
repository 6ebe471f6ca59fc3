use looper::{Looper, LooperError, LooperOptions, PollOutcome, SerialExecutor};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn prepare() -> (Looper, SerialExecutor) {
    init_logger();

    let looper = Looper::prepare(LooperOptions::default()).unwrap();
    let executor = SerialExecutor::new(&looper).unwrap();
    (looper, executor)
}

#[test]
fn jobs_run_in_submission_order() {
    let (_looper, executor) = prepare();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        let log = log.clone();
        executor.enqueue(move || log.lock().push(i)).unwrap();
    }

    assert_eq!(executor.drain().unwrap(), 10);
    assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn poll_once_drains_through_the_looper() {
    let (looper, executor) = prepare();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        let log = log.clone();
        executor.enqueue(move || log.lock().push(i)).unwrap();
    }

    assert_eq!(
        looper.poll_once(Some(Duration::from_secs(1))).unwrap(),
        PollOutcome::CallbackHandled
    );
    assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
    assert_eq!(executor.pending_jobs(), 0);
}

#[test]
fn concurrent_producers_lose_and_duplicate_nothing() {
    const PRODUCERS: usize = 4;
    const JOBS: usize = 250;

    let (looper, executor) = prepare();
    let owner = thread::current().id();
    let seen: Arc<Mutex<Vec<(usize, usize, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let executor = executor.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for j in 0..JOBS {
                    let seen = seen.clone();
                    executor
                        .enqueue(move || seen.lock().push((p, j, thread::current().id())))
                        .unwrap();
                }
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.lock().len() < PRODUCERS * JOBS {
        assert!(Instant::now() < deadline, "jobs did not all run in time");
        looper.poll_once(Some(Duration::from_millis(100))).unwrap();
    }

    for producer in producers {
        producer.join().unwrap();
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), PRODUCERS * JOBS);
    assert!(seen.iter().all(|(_, _, id)| *id == owner));

    // Each producer's jobs keep their relative order.
    for p in 0..PRODUCERS {
        let order: Vec<usize> = seen
            .iter()
            .filter(|(producer, _, _)| *producer == p)
            .map(|(_, j, _)| *j)
            .collect();
        assert_eq!(order, (0..JOBS).collect::<Vec<_>>());
    }
}

#[test]
fn spurious_wake_runs_nothing() {
    let (looper, executor) = prepare();

    looper.wake();

    assert_eq!(looper.poll_once(Some(Duration::from_secs(1))).unwrap(), PollOutcome::Woken);
    assert_eq!(executor.drain().unwrap(), 0);
}

#[test]
fn wakes_coalesce() {
    let (looper, _executor) = prepare();

    looper.wake();
    looper.wake();
    looper.wake();

    assert_eq!(looper.poll_once(Some(Duration::from_secs(1))).unwrap(), PollOutcome::Woken);
    assert_eq!(
        looper.poll_once(Some(Duration::from_millis(10))).unwrap(),
        PollOutcome::TimedOut
    );
}

#[test]
fn wake_from_another_thread_unblocks_poll() {
    let (looper, _executor) = prepare();

    let remote = looper.clone();
    let waker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        remote.wake();
    });

    assert_eq!(looper.poll_once(None).unwrap(), PollOutcome::Woken);
    waker.join().unwrap();
}

#[test]
fn shutdown_discards_queued_jobs() {
    let (looper, executor) = prepare();
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let ran = ran.clone();
        executor
            .enqueue(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    executor.shutdown().unwrap();

    assert_eq!(
        looper.poll_once(Some(Duration::from_millis(10))).unwrap(),
        PollOutcome::TimedOut
    );
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    // The discarded closures are gone too.
    assert_eq!(Arc::strong_count(&ran), 1);

    assert!(executor.is_closed());
    assert!(executor.looper().is_none());
    assert!(matches!(executor.enqueue(|| {}), Err(LooperError::ExecutorClosed)));
}

#[test]
fn shutdown_is_idempotent() {
    let (_looper, executor) = prepare();

    executor.shutdown().unwrap();
    executor.shutdown().unwrap();
    assert!(executor.is_closed());
}

#[test]
fn shutdown_from_a_job_stops_later_jobs() {
    let (looper, executor) = prepare();
    let ran = Arc::new(AtomicUsize::new(0));

    let inner = executor.clone();
    executor
        .enqueue(move || inner.shutdown().unwrap())
        .unwrap();

    let counter = ran.clone();
    executor
        .enqueue(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    looper.poll_once(Some(Duration::from_secs(1))).unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(executor.is_closed());
}

#[test]
fn job_can_enqueue_more_work() {
    let (looper, executor) = prepare();
    let log = Arc::new(Mutex::new(Vec::new()));

    let producer = executor.clone();
    let first = log.clone();
    executor
        .enqueue(move || {
            first.lock().push("outer");
            let second = first.clone();
            producer.enqueue(move || second.lock().push("inner")).unwrap();
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(1);
    while log.lock().len() < 2 {
        assert!(Instant::now() < deadline);
        looper.poll_once(Some(Duration::from_millis(100))).unwrap();
    }

    assert_eq!(*log.lock(), ["outer", "inner"]);
}

#[test]
fn for_current_thread_requires_a_looper() {
    init_logger();

    let result = thread::spawn(SerialExecutor::for_current_thread)
        .join()
        .unwrap();
    assert!(matches!(result, Err(LooperError::NotPrepared)));

    let looper = Looper::prepare(LooperOptions::default()).unwrap();
    let executor = SerialExecutor::for_current_thread().unwrap();
    assert!(Looper::ptr_eq(&executor.looper().unwrap(), &looper));
}
