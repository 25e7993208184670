// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(dead_code)]

use boardio::gpio::StateChange;
use boardio::Context;
use boardio_sim::Sim;
use std::sync::mpsc::{self, Receiver};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// max time to allow events to propagate from the sim to the watcher
pub const PROPAGATION_DELAY: Duration = Duration::from_millis(10);

// max time to wait for an expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

pub fn wait_propagation_delay() {
    std::thread::sleep(PROPAGATION_DELAY);
}

/// A context that reaches the kernel through the sim.
pub fn context(sim: &Sim) -> Context {
    Context::with_syscalls(sim.syscalls())
}

/// A listener that forwards changes to the returned receiver.
pub fn collector() -> (
    impl Fn(&StateChange) + Send + Sync + 'static,
    Receiver<StateChange>,
) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let f = move |change: &StateChange| {
        let _ = tx.lock().unwrap().send(*change);
    };
    (f, rx)
}

/// Poll until the condition holds or the timeout expires.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, f: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        wait_propagation_delay();
    }
}
