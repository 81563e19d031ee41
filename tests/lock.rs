use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use crossbeam_utils::thread::scope;
use fortune::ReadWriteLock;

// waits until `cond` holds, panicking after a few seconds
fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn readers_hold_the_lock_at_the_same_time() {
    const READERS: usize = 8;
    let lock = Arc::new(ReadWriteLock::new(42));
    let barrier = Arc::new(Barrier::new(READERS));
    let (tx, rx) = channel::unbounded();

    for _ in 0..READERS {
        let lock = Arc::clone(&lock);
        let barrier = Arc::clone(&barrier);
        let tx = tx.clone();
        thread::spawn(move || {
            let guard = lock.acquire_read();
            // only passes if every reader holds its guard at once
            barrier.wait();
            tx.send(*guard).unwrap();
        });
    }

    for _ in 0..READERS {
        let value = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("readers blocked each other");
        assert_eq!(value, 42);
    }
    wait_until(|| lock.readers() == 0);
}

#[test]
fn writers_are_exclusive() {
    let lock = ReadWriteLock::new(0_usize);
    let active_readers = AtomicUsize::new(0);
    let writer_active = AtomicBool::new(false);

    scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..200 {
                    let mut guard = lock.acquire_write();
                    assert!(!writer_active.swap(true, Ordering::SeqCst), "two writers at once");
                    assert_eq!(active_readers.load(Ordering::SeqCst), 0, "reader during write");
                    *guard += 1;
                    writer_active.store(false, Ordering::SeqCst);
                }
            });
        }
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..500 {
                    let guard = lock.acquire_read();
                    active_readers.fetch_add(1, Ordering::SeqCst);
                    assert!(!writer_active.load(Ordering::SeqCst), "writer during read");
                    assert!(*guard <= 800);
                    active_readers.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(*lock.acquire_read(), 800);
    assert_eq!(lock.readers(), 0);
    assert!(!lock.is_write_locked());
}

#[test]
fn queued_writer_holds_back_new_readers() {
    let lock = Arc::new(ReadWriteLock::new(String::from("before")));
    let first_reader = lock.acquire_read();

    let writer = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            let mut guard = lock.acquire_write();
            *guard = String::from("after");
        })
    };
    wait_until(|| lock.waiting_writers() == 1);

    // the writer is queued, so a new reader must not get in ahead of it
    assert!(lock.try_acquire_read_for(Duration::from_millis(50)).is_none());
    assert_eq!(*first_reader, "before");

    drop(first_reader);
    writer.join().unwrap();

    let guard = lock
        .try_acquire_read_for(Duration::from_secs(1))
        .expect("reader starved after the writer finished");
    assert_eq!(*guard, "after");
}

#[test]
fn write_acquisition_times_out_while_read_locked() {
    let lock = ReadWriteLock::new(1);
    let reader = lock.acquire_read();

    assert!(lock.try_acquire_write_for(Duration::from_millis(50)).is_none());
    assert_eq!(lock.waiting_writers(), 0);

    // the abandoned writer no longer blocks readers
    let second = lock.try_acquire_read_for(Duration::from_millis(100));
    assert!(second.is_some());
    assert_eq!(lock.readers(), 2);

    drop(second);
    drop(reader);
    assert!(lock.try_acquire_write_for(Duration::from_millis(100)).is_some());
}

#[test]
fn read_acquisition_times_out_while_write_locked() {
    let lock = ReadWriteLock::new(vec![1, 2, 3]);
    let mut writer = lock.acquire_write();
    writer.push(4);

    assert!(lock.is_write_locked());
    assert!(lock.try_acquire_read_for(Duration::from_millis(50)).is_none());

    drop(writer);
    assert!(!lock.is_write_locked());
    assert_eq!(*lock.acquire_read(), vec![1, 2, 3, 4]);
}

#[test]
fn guards_release_on_drop() {
    let lock = ReadWriteLock::new(());
    {
        let _a = lock.acquire_read();
        let _b = lock.acquire_read();
        assert_eq!(lock.readers(), 2);
    }
    assert_eq!(lock.readers(), 0);
    {
        let _w = lock.acquire_write();
        assert!(lock.is_write_locked());
    }
    assert!(!lock.is_write_locked());
    lock.into_inner();
}
