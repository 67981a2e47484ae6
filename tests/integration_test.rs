use strand::prelude::*;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn pool(threads: usize) -> Scheduler {
    let config = Config::builder()
        .worker_threads(threads)
        .name("itest")
        .idle_timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    Scheduler::new(config).unwrap()
}

#[test]
fn test_every_task_runs_exactly_once() {
    let scheduler = pool(3);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let counter = counter.clone();
        scheduler
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    scheduler.start().unwrap();
    scheduler.stop();

    assert_eq!(counter.load(Ordering::SeqCst), 10);
    assert_eq!(scheduler.tasks_executed(), 10);
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[test]
fn test_single_worker_preserves_fifo_order() {
    let scheduler = pool(1);
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for i in 0..20 {
        let order = order.clone();
        scheduler
            .execute(move || {
                order.lock().push(i);
            })
            .unwrap();
    }

    scheduler.start().unwrap();
    scheduler.stop();

    assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
}

#[test]
fn test_affinity_runs_only_on_target_worker() {
    for _ in 0..5 {
        let scheduler = pool(3);
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for _ in 0..8 {
            let observed = observed.clone();
            scheduler
                .submit_to(
                    Task::call(move || {
                        observed.lock().push(Scheduler::current_worker());
                    }),
                    WorkerId(2),
                )
                .unwrap();
        }

        scheduler.start().unwrap();
        scheduler.stop();

        let observed = observed.lock();
        assert_eq!(observed.len(), 8);
        assert!(observed.iter().all(|w| *w == Some(WorkerId(2))));
    }
}

#[test]
fn test_affinity_task_waits_for_pool_startup() {
    let scheduler = pool(2);
    let ran = Arc::new(AtomicBool::new(false));
    let r = ran.clone();

    // Worker 1 does not exist yet; the task must stay queued, not vanish.
    scheduler
        .submit_to(
            Task::call(move || {
                r.store(true, Ordering::SeqCst);
            }),
            WorkerId(1),
        )
        .unwrap();
    assert_eq!(scheduler.pending_tasks(), 1);
    assert!(!ran.load(Ordering::SeqCst));

    scheduler.start().unwrap();
    scheduler.stop();
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_out_of_pool_affinity_rejected_at_submission() {
    let scheduler = pool(2);
    let err = scheduler.submit_to(Task::call(|| {}), WorkerId(5)).unwrap_err();
    assert!(matches!(err, Error::InvalidAffinity { worker: 5, pool: 2 }));
    assert_eq!(scheduler.pending_tasks(), 0);
    scheduler.stop();
}

#[test]
fn test_stop_is_idempotent() {
    let scheduler = pool(2);
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    scheduler
        .execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.start().unwrap();
    scheduler.stop();
    scheduler.stop();
    scheduler.stop();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_use_caller_runs_pending_work_during_start() {
    let config = Config::builder()
        .worker_threads(1)
        .use_caller(true)
        .name("inline")
        .build()
        .unwrap();
    let scheduler = Scheduler::new(config).unwrap();

    let caller = thread::current().id();
    let ran_on = Arc::new(parking_lot::Mutex::new(None));
    let r = ran_on.clone();

    scheduler
        .execute(move || {
            *r.lock() = Some(thread::current().id());
        })
        .unwrap();

    // With one worker slot and use_caller, no OS thread is spawned; the
    // pending task must run inline on this thread before start() returns.
    scheduler.start().unwrap();
    assert_eq!(*ran_on.lock(), Some(caller));

    scheduler.stop();
}

#[test]
fn test_use_caller_drains_later_submissions_on_stop() {
    let config = Config::builder()
        .worker_threads(1)
        .use_caller(true)
        .build()
        .unwrap();
    let scheduler = Scheduler::new(config).unwrap();

    scheduler.start().unwrap();

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let counter = counter.clone();
        scheduler
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    // The only worker is the caller; these run during the stop() drain.
    scheduler.stop();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[test]
fn test_submit_after_stop_is_rejected_not_lost() {
    let scheduler = pool(1);
    scheduler.start().unwrap();
    scheduler.stop();

    let err = scheduler.execute(|| {}).unwrap_err();
    assert!(matches!(err, Error::Stopping));
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[test]
fn test_batch_submission() {
    let scheduler = pool(2);
    let counter = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<Task> = (0..16)
        .map(|_| {
            let counter = counter.clone();
            Task::call(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    scheduler.submit_many(tasks).unwrap();

    scheduler.start().unwrap();
    scheduler.stop();
    assert_eq!(counter.load(Ordering::SeqCst), 16);
}

#[test]
fn test_panicking_task_does_not_poison_the_pool() {
    let scheduler = pool(2);
    let counter = Arc::new(AtomicUsize::new(0));

    scheduler.execute(|| panic!("bad task")).unwrap();
    for _ in 0..6 {
        let counter = counter.clone();
        scheduler
            .execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    scheduler.execute(|| panic!("another bad task")).unwrap();

    scheduler.start().unwrap();
    scheduler.stop();

    // Panics are captured into the faulted fiber state; everything else ran.
    assert_eq!(counter.load(Ordering::SeqCst), 6);
    assert_eq!(scheduler.tasks_executed(), 6);
}

#[test]
fn test_yielding_fiber_gets_requeued() {
    let scheduler = pool(1);
    let turns = Arc::new(AtomicUsize::new(0));
    let t = turns.clone();

    let fiber = Fiber::new(
        64 * 1024,
        move || {
            for _ in 0..5 {
                t.fetch_add(1, Ordering::SeqCst);
                yield_now();
            }
        },
    );
    scheduler.submit(Task::fiber(fiber)).unwrap();

    scheduler.start().unwrap();
    scheduler.stop();
    assert_eq!(turns.load(Ordering::SeqCst), 5);
}

#[test]
fn test_tasks_can_submit_follow_up_work() {
    let scheduler = pool(2);
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();

    scheduler
        .execute(move || {
            let own = Scheduler::current().expect("running inside the pool");
            for _ in 0..3 {
                let c = c.clone();
                own.execute(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        })
        .unwrap();

    scheduler.start().unwrap();

    // Wait for the fan-out before draining.
    let deadline = Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    scheduler.stop();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn test_name_accessor() {
    let scheduler = pool(1);
    assert_eq!(scheduler.name(), "itest");
    scheduler.stop();
}

#[test]
fn test_construction_with_no_possible_worker_fails() {
    let err = Config::builder().worker_threads(0).build();
    assert!(err.is_err());
}

struct CountingHooks {
    tickles: AtomicUsize,
}

impl SchedulerHooks for CountingHooks {
    fn tickle(&self) {
        self.tickles.fetch_add(1, Ordering::SeqCst);
    }

    fn idle(&self, timeout: Duration) {
        thread::park_timeout(timeout);
    }
}

#[test]
fn test_submission_on_empty_queue_tickles_once() {
    let hooks = Arc::new(CountingHooks {
        tickles: AtomicUsize::new(0),
    });
    let config = Config::builder()
        .worker_threads(1)
        .idle_timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    let scheduler = Scheduler::with_hooks(config, hooks.clone()).unwrap();

    // Queue empty -> non-empty: exactly one wake for the whole batch.
    let tasks: Vec<Task> = (0..4).map(|_| Task::call(|| {})).collect();
    scheduler.submit_many(tasks).unwrap();
    assert_eq!(hooks.tickles.load(Ordering::SeqCst), 1);

    // Queue already non-empty: no additional wake.
    scheduler.execute(|| {}).unwrap();
    assert_eq!(hooks.tickles.load(Ordering::SeqCst), 1);

    scheduler.start().unwrap();
    scheduler.stop();
}

struct GatedHooks {
    external_pending: AtomicBool,
}

impl SchedulerHooks for GatedHooks {
    fn idle(&self, timeout: Duration) {
        thread::park_timeout(timeout);
    }

    fn quiescent(&self) -> bool {
        !self.external_pending.load(Ordering::SeqCst)
    }
}

#[test]
fn test_quiescent_hook_delays_shutdown() {
    let hooks = Arc::new(GatedHooks {
        external_pending: AtomicBool::new(true),
    });
    let config = Config::builder()
        .worker_threads(1)
        .idle_timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    let scheduler = Scheduler::with_hooks(config, hooks.clone()).unwrap();
    scheduler.start().unwrap();

    let h = hooks.clone();
    let clearer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        h.external_pending.store(false, Ordering::SeqCst);
    });

    let start = Instant::now();
    scheduler.stop();
    assert!(start.elapsed() >= Duration::from_millis(100));

    clearer.join().unwrap();
}
