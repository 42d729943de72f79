//! Per-direction stream lock with waiter introspection.
//!
//! [`StreamLock`] serializes access to one direction of a tunnel's
//! instruction stream. Compared with a plain mutex it adds three things the
//! tunnel layer needs:
//!
//! - **Queue depth**: [`StreamLock::has_queued_threads`] reports whether any
//!   thread is blocked in [`StreamLock::acquire`]. Upstream backpressure logic
//!   uses this to spot a stalled consumer.
//! - **Ticket order**: blocked threads are served strictly in arrival order,
//!   and a newcomer never cuts in while anyone is queued.
//! - **Close**: [`StreamLock::close`] wakes every waiter with
//!   [`GatewayError::ConcurrencyAbort`] and makes later acquisitions fail
//!   immediately.
//!
//! The lock is re-entrant for the thread that holds it; each `acquire` must be
//! matched by one `release`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use uuid::Uuid;

use crate::error::{GatewayError, Result};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    /// Re-entrant hold count of `owner`.
    holds: usize,
    /// Next ticket handed to a thread that has to wait.
    next_ticket: u64,
    /// Smallest ticket still waiting; only its holder may take the lock.
    now_serving: u64,
    /// Threads currently blocked in `acquire`.
    waiting: usize,
    closed: bool,
}

/// A fair, closable, re-entrant lock guarding one stream direction.
#[derive(Debug)]
pub struct StreamLock {
    tunnel_id: Uuid,
    state: Mutex<LockState>,
    available: Condvar,
}

impl StreamLock {
    pub fn new(tunnel_id: Uuid) -> Self {
        Self {
            tunnel_id,
            state: Mutex::new(LockState::default()),
            available: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        // The state is a handful of counters updated atomically under the
        // mutex, so it stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the calling thread holds the lock.
    pub fn acquire(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state();

        if state.closed {
            return Err(GatewayError::InvalidState(format!(
                "tunnel {} is closed",
                self.tunnel_id
            )));
        }

        if state.owner == Some(me) {
            state.holds += 1;
            return Ok(());
        }

        if state.owner.is_none() && state.waiting == 0 {
            state.owner = Some(me);
            state.holds = 1;
            return Ok(());
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting += 1;

        loop {
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);

            if state.closed {
                state.waiting -= 1;
                return Err(GatewayError::ConcurrencyAbort(self.tunnel_id));
            }
            if state.owner.is_none() && state.now_serving == ticket {
                break;
            }
        }

        state.now_serving += 1;
        state.waiting -= 1;
        state.owner = Some(me);
        state.holds = 1;
        Ok(())
    }

    /// Release one hold. Fails if the calling thread does not hold the lock.
    pub fn release(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state();

        if state.owner != Some(me) {
            return Err(GatewayError::InvalidState(format!(
                "stream lock of tunnel {} released by a thread that does not hold it",
                self.tunnel_id
            )));
        }

        state.holds -= 1;
        if state.holds == 0 {
            state.owner = None;
            if state.waiting > 0 {
                drop(state);
                // Every waiter re-checks its ticket; only one can proceed.
                self.available.notify_all();
            }
        }
        Ok(())
    }

    /// True iff at least one thread is blocked in [`Self::acquire`].
    pub fn has_queued_threads(&self) -> bool {
        self.state().waiting > 0
    }

    /// Number of threads blocked in [`Self::acquire`].
    pub fn queue_len(&self) -> usize {
        self.state().waiting
    }

    /// Whether the calling thread currently holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state().owner == Some(thread::current().id())
    }

    /// Permanently close the lock and abort every waiter.
    ///
    /// The current holder (if any) keeps its hold and may still release it.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
