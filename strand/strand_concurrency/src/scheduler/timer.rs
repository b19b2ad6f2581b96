//! Process-wide timer.
//!
//! One background thread owns a min-heap of deadlines and runs each expired
//! task in deadline order. Tasks must be short: they typically post an
//! expiry into an actor mailbox or force a timeout failure on a deferred.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};
use once_cell::sync::Lazy;

use crate::deferred::failure::panic_message;

type TimerTask = Box<dyn FnOnce() + Send + 'static>;

static TIMER: Lazy<Timer> = Lazy::new(Timer::start);

/// The shared timer, started on first use.
pub fn global() -> &'static Timer {
    &TIMER
}

struct TimerEntry {
    deadline: Instant,
    sequence: u64,
    task: TimerTask,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimerEntry {}

#[derive(Default)]
struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    next_sequence: u64,
}

impl TimerHeap {
    fn insert(&mut self, deadline: Instant, task: TimerTask) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(TimerEntry {
            deadline,
            sequence,
            task,
        });
    }

    fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    fn pop_expired(&mut self, now: Instant) -> Vec<TimerTask> {
        let mut expired = Vec::new();
        while self.peek_deadline().map_or(false, |deadline| deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.task);
            }
        }
        expired
    }
}

/// Handle to the timer thread.
pub struct Timer {
    sender: Option<Sender<(Instant, TimerTask)>>,
}

impl Timer {
    fn start() -> Self {
        let (sender, receiver) = unbounded();
        let spawned = thread::Builder::new()
            .name("strand-timer".to_string())
            .spawn(move || Self::run(receiver));

        match spawned {
            Ok(_) => {
                debug!("Timer thread started");
                Self {
                    sender: Some(sender),
                }
            }
            Err(e) => {
                error!("Failed to spawn timer thread: {}", e);
                Self { sender: None }
            }
        }
    }

    fn run(receiver: Receiver<(Instant, TimerTask)>) {
        let mut timers = TimerHeap::default();

        loop {
            for task in timers.pop_expired(Instant::now()) {
                if let Err(e) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    error!("Timer task panicked: {}", panic_message(e.as_ref()));
                }
            }

            let received = match timers.peek_deadline() {
                Some(deadline) => receiver.recv_deadline(deadline),
                None => receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok((deadline, task)) => timers.insert(deadline, task),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Run `task` on the timer thread once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        match &self.sender {
            Some(sender) => {
                if sender.send((deadline, Box::new(task))).is_err() {
                    warn!("Timer thread is gone; dropping timer task");
                }
            }
            None => warn!("Timer unavailable; dropping timer task"),
        }
    }
}
