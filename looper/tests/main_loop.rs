use looper::{Looper, LooperBuilder, LooperError, MainLoop, SerialExecutor, yield_now};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn setup_is_idempotent() {
    init_logger();

    let main_loop = MainLoop::new();
    assert!(!main_loop.is_set_up());

    main_loop.setup().unwrap();
    let looper = main_loop.looper().unwrap();
    let executor = main_loop.executor().unwrap();

    main_loop.setup().unwrap();

    assert!(Looper::ptr_eq(&looper, &main_loop.looper().unwrap()));
    assert!(SerialExecutor::ptr_eq(&executor, &main_loop.executor().unwrap()));

    main_loop.teardown().unwrap();
}

#[test]
fn setup_from_another_thread_keeps_the_original_binding() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();
    let looper = main_loop.looper().unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            main_loop.setup().unwrap();
            let bound = main_loop.looper().unwrap();
            assert!(!bound.is_owner_thread());
            assert!(Looper::for_thread().is_none());
        });
    });

    assert!(Looper::ptr_eq(&looper, &main_loop.looper().unwrap()));
    main_loop.teardown().unwrap();
}

#[test]
fn unbound_main_loop_is_unavailable() {
    init_logger();

    let main_loop = MainLoop::default();

    assert!(matches!(main_loop.looper(), Err(LooperError::MainLoopUnavailable)));
    assert!(matches!(main_loop.executor(), Err(LooperError::MainLoopUnavailable)));
    assert!(matches!(main_loop.enqueue(|| {}), Err(LooperError::MainLoopUnavailable)));
    main_loop.teardown().unwrap();
}

#[test]
fn failed_setup_leaves_main_loop_unbound() {
    init_logger();

    let _looper = LooperBuilder::new().allow_non_callbacks(true).prepare().unwrap();
    let main_loop = MainLoop::new();

    assert!(matches!(main_loop.setup(), Err(LooperError::PreparationFailure(_))));
    assert!(!main_loop.is_set_up());
}

#[test]
fn teardown_discards_pending_jobs() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();
    let executor = main_loop.executor().unwrap();
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let ran = ran.clone();
        main_loop
            .enqueue(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    main_loop.teardown().unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(!main_loop.is_set_up());
    assert!(matches!(executor.enqueue(|| {}), Err(LooperError::ExecutorClosed)));
    assert!(matches!(main_loop.enqueue(|| {}), Err(LooperError::MainLoopUnavailable)));

    // It can be bound again afterwards.
    main_loop.setup().unwrap();
    assert!(!SerialExecutor::ptr_eq(&executor, &main_loop.executor().unwrap()));
    main_loop.teardown().unwrap();
}

#[test]
fn block_on_returns_the_output() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();

    assert_eq!(main_loop.block_on(async { 40 + 2 }).unwrap(), 42);

    main_loop.teardown().unwrap();
}

#[test]
fn block_on_serves_jobs_from_other_threads() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();
    let owner = thread::current().id();

    let executor = main_loop.executor().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    let producer = thread::spawn(move || {
        executor
            .enqueue(move || tx.send(thread::current().id()).unwrap())
            .unwrap();
    });

    let ran_on = main_loop
        .block_on(async move {
            loop {
                if let Ok(id) = rx.try_recv() {
                    return id;
                }
                yield_now().await;
            }
        })
        .unwrap();

    producer.join().unwrap();
    assert_eq!(ran_on, owner);

    main_loop.teardown().unwrap();
}

#[test]
fn block_on_off_the_main_thread_is_rejected() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();

    thread::scope(|s| {
        let result = s.spawn(|| main_loop.block_on(async {})).join().unwrap();
        assert!(matches!(result, Err(LooperError::WrongThread)));
    });

    main_loop.teardown().unwrap();
}

#[test]
fn yield_now_requeues_behind_pending_jobs() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let task_log = log.clone();
    let handle = main_loop
        .spawn(async move {
            task_log.lock().push("task: before yield");
            yield_now().await;
            task_log.lock().push("task: after yield");
            7
        })
        .unwrap();

    let job_log = log.clone();
    main_loop
        .enqueue(move || job_log.lock().push("job"))
        .unwrap();

    let value = main_loop.block_on(handle).unwrap().unwrap();

    assert_eq!(value, 7);
    assert_eq!(
        *log.lock(),
        ["task: before yield", "job", "task: after yield"]
    );

    main_loop.teardown().unwrap();
}

#[test]
fn aborted_task_resolves_cancelled() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();

    let handle = main_loop.spawn(std::future::pending::<()>()).unwrap();
    handle.abort();
    assert!(handle.is_finished());

    let result = main_loop.block_on(handle).unwrap();
    assert!(matches!(result, Err(LooperError::TaskCancelled)));

    main_loop.teardown().unwrap();
}

#[test]
fn abort_stops_a_suspended_task() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();
    let polls = Arc::new(AtomicUsize::new(0));

    let counter = polls.clone();
    let handle = main_loop
        .spawn(async move {
            while counter.fetch_add(1, Ordering::SeqCst) < usize::MAX {
                yield_now().await;
            }
        })
        .unwrap();

    main_loop.block_on(yield_now()).unwrap();
    assert!(polls.load(Ordering::SeqCst) >= 1);

    handle.abort();
    let stopped_at = polls.load(Ordering::SeqCst);

    main_loop
        .block_on(async {
            for _ in 0..3 {
                yield_now().await;
            }
        })
        .unwrap();

    assert_eq!(polls.load(Ordering::SeqCst), stopped_at);
    assert!(matches!(main_loop.block_on(handle).unwrap(), Err(LooperError::TaskCancelled)));

    main_loop.teardown().unwrap();
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn teardown_cancels_spawned_tasks() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();
    let dropped = Arc::new(AtomicBool::new(false));

    // Polled once, then parked with nothing queued for it.
    let guard = SetOnDrop(dropped.clone());
    let parked = main_loop
        .spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await
        })
        .unwrap();
    main_loop.block_on(yield_now()).unwrap();
    assert!(!parked.is_finished());

    // Never polled.
    let queued = main_loop.spawn(async { 1 }).unwrap();

    main_loop.teardown().unwrap();

    assert!(queued.is_finished());
    assert!(parked.is_finished());
    assert!(dropped.load(Ordering::SeqCst));

    main_loop.setup().unwrap();
    assert!(matches!(main_loop.block_on(parked).unwrap(), Err(LooperError::TaskCancelled)));
    assert!(matches!(main_loop.block_on(queued).unwrap(), Err(LooperError::TaskCancelled)));
    main_loop.teardown().unwrap();
}

#[test]
fn teardown_from_another_thread_ends_block_on() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    main_loop
        .enqueue(move || started_tx.send(()).unwrap())
        .unwrap();

    let remote = &main_loop;
    thread::scope(|s| {
        s.spawn(move || {
            started_rx.recv().unwrap();
            remote.teardown().unwrap();
        });

        let result = main_loop.block_on(std::future::pending::<()>());
        assert!(matches!(result, Err(LooperError::TaskCancelled)));
    });

    assert!(!main_loop.is_set_up());
}

#[test]
fn join_handle_can_be_awaited_by_another_task() {
    init_logger();

    let main_loop = MainLoop::new();
    main_loop.setup().unwrap();

    let inner = main_loop.spawn(async { "inner" }).unwrap();
    let outer = main_loop
        .spawn(async move { inner.await.map(|value| format!("outer({value})")) })
        .unwrap();

    let result = main_loop.block_on(outer).unwrap().unwrap().unwrap();
    assert_eq!(result, "outer(inner)");

    main_loop.teardown().unwrap();
}
