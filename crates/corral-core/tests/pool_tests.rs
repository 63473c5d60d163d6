use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use corral_core::{CorralError, Pool, PoolConfig, TaskPanic};
use crossbeam_channel::{bounded, unbounded};

const WAIT: Duration = Duration::from_secs(5);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn current_thread_name() -> String {
    thread::current().name().unwrap_or_default().to_string()
}

#[test]
fn rejects_invalid_capacity_and_expiration() {
    assert!(matches!(Pool::new(0), Err(CorralError::InvalidCapacity)));
    assert!(matches!(
        Pool::with_expiration(2, Duration::ZERO),
        Err(CorralError::InvalidExpiration)
    ));
}

#[test]
fn new_pool_starts_empty() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(3)?;

    assert_eq!(pool.capacity(), 3);
    assert_eq!(pool.running(), 0);
    assert_eq!(pool.free(), 3);
    assert_eq!(pool.idle(), 0);
    assert!(!pool.is_closed());
    assert_eq!(pool.expiration(), corral_core::DEFAULT_EXPIRATION);

    Ok(())
}

#[test]
fn saturated_pool_blocks_submit_until_a_worker_frees() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(Pool::new(3)?);
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (started_tx, started_rx) = unbounded::<usize>();

    for id in 0..3usize {
        let gate = gate_rx.clone();
        let started = started_tx.clone();
        pool.submit(move || {
            started.send(id).expect("test receiver dropped");
            let _ = gate.recv();
        })?;
    }
    for _ in 0..3 {
        started_rx.recv_timeout(WAIT)?;
    }

    assert_eq!(pool.running(), 3);
    assert_eq!(pool.free(), 0);

    let submitted = Arc::new(AtomicBool::new(false));
    let submitter = {
        let pool = Arc::clone(&pool);
        let submitted = Arc::clone(&submitted);
        thread::spawn(move || {
            let result = pool.submit(|| {});
            submitted.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!submitted.load(Ordering::SeqCst));
    assert_eq!(pool.running(), 3);

    gate_tx.send(())?;
    submitter.join().expect("submitter thread panicked")?;
    assert!(submitted.load(Ordering::SeqCst));

    drop(gate_tx);
    assert!(wait_until(|| pool.running() == 0));
    assert_eq!(pool.free(), 3);

    Ok(())
}

#[test]
fn running_never_exceeds_capacity() -> Result<(), Box<dyn std::error::Error>> {
    let capacity = 4usize;
    let pool = Arc::new(Pool::new(capacity)?);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let sampling = Arc::new(AtomicBool::new(true));

    let sampler = {
        let pool = Arc::clone(&pool);
        let sampling = Arc::clone(&sampling);
        thread::spawn(move || {
            let mut max_running = 0;
            while sampling.load(Ordering::SeqCst) {
                max_running = max_running.max(pool.running());
                thread::yield_now();
            }
            max_running
        })
    };

    let mut submitters = Vec::new();
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        let completed = Arc::clone(&completed);
        submitters.push(thread::spawn(move || -> Result<(), CorralError> {
            for _ in 0..50 {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                let completed = Arc::clone(&completed);
                pool.submit(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(200));
                    active.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                })?;
            }
            Ok(())
        }));
    }
    for submitter in submitters {
        submitter.join().expect("submitter thread panicked")?;
    }

    assert!(wait_until(|| completed.load(Ordering::SeqCst) == 400));
    assert!(wait_until(|| pool.running() == 0));
    sampling.store(false, Ordering::SeqCst);
    let max_running = sampler.join().expect("sampler thread panicked");

    assert!(peak.load(Ordering::SeqCst) <= capacity);
    assert!(max_running <= capacity);
    assert_eq!(pool.free(), capacity);
    assert!(pool.idle() <= capacity);

    Ok(())
}

#[test]
fn concurrent_release_closes_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(Pool::new(2)?);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.release()
            })
        })
        .collect();

    let closed_by = handles
        .into_iter()
        .map(|handle| handle.join().expect("release thread panicked"))
        .filter(|closed| *closed)
        .count();

    assert_eq!(closed_by, 1);
    assert!(pool.is_closed());
    assert!(!pool.release());

    Ok(())
}

#[test]
fn submit_after_release_fails_until_restart() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(2)?;
    assert!(pool.restart());

    pool.release();
    let result = pool.submit(|| {});
    assert!(matches!(result, Err(CorralError::PoolClosed)));
    assert!(result.is_err_and(|error| error.is_pool_closed()));

    assert!(pool.restart());
    assert!(!pool.is_closed());

    let (done_tx, done_rx) = bounded(1);
    pool.submit(move || {
        done_tx.send(()).expect("test receiver dropped");
    })?;
    done_rx.recv_timeout(WAIT)?;

    Ok(())
}

#[test]
fn release_wakes_blocked_submitters() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(Pool::new(1)?);
    let (gate_tx, gate_rx) = bounded::<()>(1);
    let (started_tx, started_rx) = bounded(1);

    pool.submit(move || {
        started_tx.send(()).expect("test receiver dropped");
        let _ = gate_rx.recv();
    })?;
    started_rx.recv_timeout(WAIT)?;

    let submitter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.submit(|| {}))
    };
    thread::sleep(Duration::from_millis(50));

    assert!(pool.release());
    let result = submitter.join().expect("submitter thread panicked");
    assert!(matches!(result, Err(CorralError::PoolClosed)));

    gate_tx.send(())?;
    assert!(wait_until(|| pool.running() == 0));

    Ok(())
}

#[test]
fn release_lets_running_tasks_finish() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(2)?;
    let (gate_tx, gate_rx) = bounded::<()>(1);
    let (started_tx, started_rx) = bounded(1);
    let finished = Arc::new(AtomicBool::new(false));

    {
        let finished = Arc::clone(&finished);
        pool.submit(move || {
            started_tx.send(()).expect("test receiver dropped");
            let _ = gate_rx.recv();
            finished.store(true, Ordering::SeqCst);
        })?;
    }
    started_rx.recv_timeout(WAIT)?;

    assert!(pool.release());
    assert_eq!(pool.running(), 1);
    assert!(!finished.load(Ordering::SeqCst));

    gate_tx.send(())?;
    assert!(wait_until(|| finished.load(Ordering::SeqCst) && pool.running() == 0));
    assert_eq!(pool.idle(), 0);

    Ok(())
}

#[test]
fn panicking_task_is_reported_and_capacity_is_kept() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(2)?;
    let (fault_tx, fault_rx) = unbounded::<TaskPanic>();
    pool.set_panic_handler(move |fault| {
        let _ = fault_tx.send(fault.clone());
    });

    for _ in 0..5 {
        pool.submit(|| panic!("boom"))?;
    }
    for _ in 0..5 {
        let fault = fault_rx.recv_timeout(WAIT)?;
        assert_eq!(fault.message, "boom");
    }

    assert!(wait_until(|| pool.running() == 0));
    assert_eq!(pool.free(), 2);

    let barrier = Arc::new(Barrier::new(3));
    for _ in 0..2 {
        let barrier = Arc::clone(&barrier);
        pool.submit(move || {
            barrier.wait();
        })?;
    }
    // Both tasks can only pass the barrier if two workers run at once.
    barrier.wait();
    assert!(wait_until(|| pool.running() == 0));

    Ok(())
}

#[test]
fn panic_without_handler_does_not_stop_the_pool() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(1)?;
    pool.submit(|| panic!("unhandled"))?;

    let (done_tx, done_rx) = bounded(1);
    pool.submit(move || {
        done_tx.send(current_thread_name()).expect("test receiver dropped");
    })?;

    let name = done_rx.recv_timeout(WAIT)?;
    assert!(name.starts_with(corral_core::DEFAULT_THREAD_NAME));

    Ok(())
}

#[test]
fn panicking_handler_is_contained() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(1)?;
    pool.set_panic_handler(|_| panic!("handler failed"));

    pool.submit(|| panic!("task failed"))?;

    let (done_tx, done_rx) = bounded(1);
    pool.submit(move || {
        done_tx.send(()).expect("test receiver dropped");
    })?;
    done_rx.recv_timeout(WAIT)?;
    assert!(wait_until(|| pool.running() == 0));

    Ok(())
}

#[test]
fn idle_workers_are_reused_last_in_first_out() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::with_expiration(2, Duration::from_secs(60))?;
    let (names_tx, names_rx) = unbounded::<(char, String)>();
    let (first_gate_tx, first_gate_rx) = bounded::<()>(1);
    let (second_gate_tx, second_gate_rx) = bounded::<()>(1);

    for (label, gate) in [('a', first_gate_rx), ('b', second_gate_rx)] {
        let names = names_tx.clone();
        pool.submit(move || {
            names
                .send((label, current_thread_name()))
                .expect("test receiver dropped");
            let _ = gate.recv();
        })?;
    }

    let mut first_name = String::new();
    let mut second_name = String::new();
    for _ in 0..2 {
        match names_rx.recv_timeout(WAIT)? {
            ('a', name) => first_name = name,
            (_, name) => second_name = name,
        }
    }
    assert_ne!(first_name, second_name);

    first_gate_tx.send(())?;
    assert!(wait_until(|| pool.idle() == 1));
    second_gate_tx.send(())?;
    assert!(wait_until(|| pool.idle() == 2));

    let (probe_tx, probe_rx) = bounded(1);
    pool.submit(move || {
        probe_tx.send(current_thread_name()).expect("test receiver dropped");
    })?;

    assert_eq!(probe_rx.recv_timeout(WAIT)?, second_name);

    Ok(())
}

#[test]
fn third_task_waits_for_a_free_worker() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::with_expiration(2, Duration::from_secs(1))?;
    let timings: Arc<Mutex<Vec<(usize, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

    for index in 0..3usize {
        let timings = Arc::clone(&timings);
        pool.submit(move || {
            let started = Instant::now();
            thread::sleep(Duration::from_millis(50));
            timings
                .lock()
                .expect("timings mutex poisoned")
                .push((index, started, Instant::now()));
        })?;
    }

    assert!(wait_until(|| {
        timings.lock().expect("timings mutex poisoned").len() == 3
    }));

    let mut recorded = timings.lock().expect("timings mutex poisoned").clone();
    recorded.sort_by_key(|(index, _, _)| *index);
    let first_finish = recorded[0].2.min(recorded[1].2);
    assert!(recorded[2].1 >= first_finish);

    assert!(wait_until(|| pool.free() == 2));
    assert_eq!(pool.running(), 0);

    Ok(())
}

#[test]
fn stats_reflect_pool_occupancy() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Pool::new(3)?;
    let (gate_tx, gate_rx) = bounded::<()>(1);
    let (started_tx, started_rx) = bounded(1);

    pool.submit(move || {
        started_tx.send(()).expect("test receiver dropped");
        let _ = gate_rx.recv();
    })?;
    started_rx.recv_timeout(WAIT)?;

    let stats = pool.stats();
    assert_eq!(stats.capacity, 3);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.free, 2);
    assert_eq!(stats.idle, 0);
    assert!(!stats.closed);

    gate_tx.send(())?;
    assert!(wait_until(|| pool.stats().idle == 1));
    assert_eq!(pool.stats().running, 0);

    pool.release();
    let stats = pool.stats();
    assert!(stats.closed);
    assert_eq!(stats.idle, 0);

    Ok(())
}

#[test]
fn workers_use_configured_thread_name() -> Result<(), Box<dyn std::error::Error>> {
    let config = PoolConfig::new(1).with_thread_name("ingest");
    let pool = Pool::from_config(&config)?;

    let (name_tx, name_rx) = bounded(1);
    pool.submit(move || {
        name_tx.send(current_thread_name()).expect("test receiver dropped");
    })?;

    assert_eq!(name_rx.recv_timeout(WAIT)?, "ingest-0");

    Ok(())
}
