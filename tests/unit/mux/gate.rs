use super::*;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn open_is_set_once() {
    let gate = StartGate::new();
    assert!(gate.open());
    assert!(!gate.open());
    assert!(gate.is_open());
    assert!(!gate.is_closed());
    assert!(gate.wait().is_ok());
    assert!(gate.wait().is_ok());
}

#[test]
fn close_after_open_is_ignored() {
    let gate = StartGate::new();
    gate.open();
    assert!(!gate.close("late abort"));
    assert!(gate.wait().is_ok());
}

#[test]
fn closed_gate_fails_waiters_with_abort() {
    let gate = StartGate::new();
    assert!(gate.close("feeder failed"));
    assert!(gate.is_closed());
    assert!(!gate.open());
    let err = gate.wait().unwrap_err();
    assert!(err.is_abort());
    assert!(err.to_string().contains("feeder failed"));
}

#[test]
fn open_releases_blocked_waiters() {
    let gate = Arc::new(StartGate::new());
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let g = gate.clone();
            std::thread::spawn(move || g.wait())
        })
        .collect();

    std::thread::sleep(Duration::from_millis(10));
    gate.open();

    for w in waiters {
        assert!(w.join().unwrap().is_ok());
    }
}

#[test]
fn close_releases_blocked_waiters() {
    let gate = Arc::new(StartGate::new());
    let g = gate.clone();
    let waiter = std::thread::spawn(move || g.wait());

    std::thread::sleep(Duration::from_millis(10));
    gate.close("aborted");

    assert!(waiter.join().unwrap().unwrap_err().is_abort());
}
