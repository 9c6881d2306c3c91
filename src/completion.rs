//! One-shot completion signal owned by every node.
//!
//! A [`Completion`] resolves exactly once, either successfully or with the
//! fault that stopped the node. Successors never wait on it: they subscribe a
//! callback with [`Completion::on_complete`], which runs on the resolving
//! thread. Blocking [`Completion::wait`] is for callers outside the pipeline.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::EtlError;
use crate::utils::lock;

type Callback = Box<dyn FnOnce(&Result<(), EtlError>) + Send>;

enum State {
    Pending(Vec<Callback>),
    Done(Result<(), EtlError>),
}

struct Inner {
    state: Mutex<State>,
    done: Condvar,
}

/// Cheaply clonable handle to a node's completion.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<Inner>,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("result", &self.result()).finish()
    }
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                done: Condvar::new(),
            }),
        }
    }

    /// Run `f` once this completion resolves. If it already has, `f` runs
    /// immediately on the calling thread.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Result<(), EtlError>) + Send + 'static,
    {
        let mut state = lock(&self.inner.state);
        match &mut *state {
            State::Pending(callbacks) => callbacks.push(Box::new(f)),
            State::Done(result) => {
                let result = result.clone();
                drop(state);
                f(&result);
            }
        }
    }

    /// Resolve the completion. Returns `false` if it was already resolved,
    /// in which case `result` is discarded.
    pub(crate) fn resolve(&self, result: Result<(), EtlError>) -> bool {
        let callbacks = {
            let mut state = lock(&self.inner.state);
            if matches!(*state, State::Done(_)) {
                return false;
            }
            match std::mem::replace(&mut *state, State::Done(result.clone())) {
                State::Pending(callbacks) => callbacks,
                State::Done(_) => Vec::new(),
            }
        };
        self.inner.done.notify_all();
        for cb in callbacks {
            cb(&result);
        }
        true
    }

    pub fn is_done(&self) -> bool {
        matches!(*lock(&self.inner.state), State::Done(_))
    }

    /// The outcome, if resolved.
    pub fn result(&self) -> Option<Result<(), EtlError>> {
        match &*lock(&self.inner.state) {
            State::Done(r) => Some(r.clone()),
            State::Pending(_) => None,
        }
    }

    /// Block until resolved. Never call this from inside a node worker.
    pub fn wait(&self) -> Result<(), EtlError> {
        let mut state = lock(&self.inner.state);
        loop {
            if let State::Done(r) = &*state {
                return r.clone();
            }
            state = self
                .inner
                .done
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`; `None` if still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), EtlError>> {
        let state = lock(&self.inner.state);
        let (state, _) = self
            .inner
            .done
            .wait_timeout_while(state, timeout, |s| matches!(s, State::Pending(_)))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match &*state {
            State::Done(r) => Some(r.clone()),
            State::Pending(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn resolves_once_and_runs_late_subscribers() {
        let c = Completion::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        c.on_complete(move |r| {
            assert!(r.is_ok());
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(c.resolve(Ok(())));
        assert!(!c.resolve(Err(EtlError::Cancelled)));
        let h = Arc::clone(&hits);
        c.on_complete(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(c.wait().is_ok());
    }
}
