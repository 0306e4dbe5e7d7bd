use std::cell::{Cell, RefCell};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::bug;

struct ScheduledAction {
    due: Instant,
    seq: u64,
    cancelled: Rc<Cell<bool>>,
    action: Option<Box<dyn FnOnce()>>,
}

impl PartialEq for ScheduledAction {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledAction {}

impl PartialOrd for ScheduledAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledAction {
    fn cmp(&self, other: &Self) -> Ordering {
        // ties break by enqueue order
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Cancellation capability for one scheduled action.
///
/// Dropping the handle does not cancel; a fire-and-forget `schedule` call
/// stays armed. Cancelling after the action ran is a no-op.
pub struct ScheduleHandle {
    cancelled: Rc<Cell<bool>>,
}

impl ScheduleHandle {
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

struct Inner {
    now: Instant,
    next_seq: u64,
    queue: BinaryHeap<Reverse<ScheduledAction>>,
}

/// Virtual-time scheduler driven by the frame loop.
///
/// The clock only moves when [`advance_to`](Self::advance_to) is called, so
/// every due action runs at a well-defined point of the frame, never from a
/// timer thread. Ordering is by due time, then enqueue order. Actions may
/// schedule further actions; an action scheduling at or before the clock
/// being advanced to runs within the same drain. Calling `advance_to` from
/// inside an action is a runtime defect and aborts.
pub struct GameLoopScheduler {
    inner: RefCell<Inner>,
    draining: Cell<bool>,
}

impl GameLoopScheduler {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Creates a scheduler whose clock starts at `origin`.
    pub fn starting_at(origin: Instant) -> Self {
        Self {
            inner: RefCell::new(Inner {
                now: origin,
                next_seq: 0,
                queue: BinaryHeap::new(),
            }),
            draining: Cell::new(false),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Instant {
        self.inner.borrow().now
    }

    /// Number of actions still queued (including cancelled ones not yet
    /// reaped).
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Due time of the earliest queued action, if any. The frame loop uses
    /// this to decide how long it may park.
    pub fn next_due(&self) -> Option<Instant> {
        self.inner
            .borrow()
            .queue
            .peek()
            .map(|Reverse(entry)| entry.due)
    }

    /// Queues `action` to run once the clock reaches now + `delay`.
    pub fn schedule(&self, delay: Duration, action: impl FnOnce() + 'static) -> ScheduleHandle {
        let mut inner = self.inner.borrow_mut();
        let due = inner.now + delay;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let cancelled = Rc::new(Cell::new(false));
        inner.queue.push(Reverse(ScheduledAction {
            due,
            seq,
            cancelled: cancelled.clone(),
            action: Some(Box::new(action)),
        }));

        ScheduleHandle { cancelled }
    }

    /// Moves the clock forward to `now` (never backward) and runs every due
    /// action in order. Returns once no queued action is due.
    pub fn advance_to(&self, now: Instant) {
        if self.draining.replace(true) {
            bug!("5B3E09D1", "scheduler advanced from inside a scheduled action");
        }

        {
            let mut inner = self.inner.borrow_mut();
            if now > inner.now {
                inner.now = now;
            }
        }

        loop {
            // Pop while holding the borrow, run with it released, so the
            // action is free to schedule.
            let next = {
                let mut inner = self.inner.borrow_mut();
                let clock = inner.now;
                let due = inner.queue.peek().is_some_and(|Reverse(e)| e.due <= clock);
                if due {
                    inner.queue.pop().map(|Reverse(mut entry)| {
                        (entry.action.take(), entry.cancelled)
                    })
                } else {
                    None
                }
            };

            match next {
                Some((Some(action), cancelled)) => {
                    if !cancelled.get() {
                        action();
                    }
                }
                Some((None, _)) => bug!("A1B7D530", "scheduled action queued without a body"),
                None => break,
            }
        }

        self.draining.set(false);
    }
}

impl Default for GameLoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |tag: u32| -> Box<dyn FnOnce()> {
                let log = log.clone();
                Box::new(move || log.borrow_mut().push(tag))
            }
        };
        (log, make)
    }

    // ── ordering ──

    #[test]
    fn runs_in_due_time_order() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        sched.schedule(Duration::from_millis(30), act(3));
        sched.schedule(Duration::from_millis(10), act(1));
        sched.schedule(Duration::from_millis(20), act(2));

        sched.advance_to(origin + Duration::from_millis(50));
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn ties_break_by_enqueue_order() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        for tag in 0..4 {
            sched.schedule(Duration::from_millis(10), act(tag));
        }

        sched.advance_to(origin + Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn not_yet_due_actions_stay_queued() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        sched.schedule(Duration::from_millis(10), act(1));
        sched.schedule(Duration::from_millis(100), act(2));

        sched.advance_to(origin + Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(sched.pending(), 1);
        assert_eq!(sched.next_due(), Some(origin + Duration::from_millis(100)));

        sched.advance_to(origin + Duration::from_millis(100));
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn half_second_advance_does_not_fire_a_one_second_action() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        sched.schedule(Duration::from_secs(1), act(1));

        sched.advance_to(origin + Duration::from_millis(500));
        assert!(log.borrow().is_empty());

        sched.advance_to(origin + Duration::from_millis(1500));
        assert_eq!(*log.borrow(), vec![1]);

        // once fired, it never fires again
        sched.advance_to(origin + Duration::from_secs(10));
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn clock_never_moves_backward() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);

        sched.advance_to(origin + Duration::from_millis(50));
        sched.advance_to(origin + Duration::from_millis(10));
        assert_eq!(sched.now(), origin + Duration::from_millis(50));
    }

    #[test]
    fn zero_delay_runs_on_the_next_advance() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        sched.schedule(Duration::ZERO, act(1));
        assert!(log.borrow().is_empty());

        sched.advance_to(origin);
        assert_eq!(*log.borrow(), vec![1]);
    }

    // ── scheduling from actions ──

    #[test]
    fn action_scheduling_within_the_drain_runs_in_the_same_drain() {
        let origin = Instant::now();
        let sched = Rc::new(GameLoopScheduler::starting_at(origin));
        let (log, act) = recorder();

        sched.schedule(Duration::from_millis(10), {
            let sched = sched.clone();
            let act = act(2);
            let log = log.clone();
            move || {
                log.borrow_mut().push(1);
                sched.schedule(Duration::from_millis(5), act);
            }
        });

        sched.advance_to(origin + Duration::from_millis(20));
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn action_scheduling_past_the_drain_waits() {
        let origin = Instant::now();
        let sched = Rc::new(GameLoopScheduler::starting_at(origin));
        let (log, act) = recorder();

        sched.schedule(Duration::from_millis(10), {
            let sched = sched.clone();
            let act = act(2);
            move || {
                sched.schedule(Duration::from_millis(100), act);
            }
        });

        sched.advance_to(origin + Duration::from_millis(20));
        assert!(log.borrow().is_empty());
        assert_eq!(sched.pending(), 1);

        sched.advance_to(origin + Duration::from_millis(110));
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    #[should_panic(expected = "bug 5B3E09D1")]
    fn reentrant_advance_aborts() {
        let origin = Instant::now();
        let sched = Rc::new(GameLoopScheduler::starting_at(origin));

        sched.schedule(Duration::ZERO, {
            let sched = sched.clone();
            move || sched.advance_to(Instant::now())
        });

        sched.advance_to(origin);
    }

    // ── cancellation ──

    #[test]
    fn cancelled_action_never_runs() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        let handle = sched.schedule(Duration::from_millis(10), act(1));
        sched.schedule(Duration::from_millis(10), act(2));
        handle.cancel();
        assert!(handle.is_cancelled());

        sched.advance_to(origin + Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn dropping_the_handle_does_not_cancel() {
        let origin = Instant::now();
        let sched = GameLoopScheduler::starting_at(origin);
        let (log, act) = recorder();

        drop(sched.schedule(Duration::from_millis(10), act(1)));

        sched.advance_to(origin + Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn cancel_during_the_drain_stops_a_later_action() {
        let origin = Instant::now();
        let sched = Rc::new(GameLoopScheduler::starting_at(origin));
        let (log, act) = recorder();

        let victim = Rc::new(RefCell::new(None::<ScheduleHandle>));
        sched.schedule(Duration::from_millis(1), {
            let victim = victim.clone();
            move || {
                if let Some(handle) = victim.borrow().as_ref() {
                    handle.cancel();
                }
            }
        });
        *victim.borrow_mut() = Some(sched.schedule(Duration::from_millis(2), act(1)));

        sched.advance_to(origin + Duration::from_millis(5));
        assert!(log.borrow().is_empty());
    }
}
