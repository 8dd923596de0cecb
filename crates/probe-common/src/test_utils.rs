//! In-memory [`InstrumentationPort`] for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use crate::attach::{AttachError, AttachPoint, InstrumentationPort};

/// Records every attach/detach call. Clones share the same state, so a test
/// can keep a handle while the registry owns another.
///
/// Attaching an attached point or detaching a detached one panics.
#[derive(Clone, Default)]
pub struct MockPort {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    attached: HashSet<AttachPoint>,
    attach_calls: HashMap<AttachPoint, usize>,
    detach_calls: HashMap<AttachPoint, usize>,
    failing: HashSet<AttachPoint>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following attach of `point` fail.
    pub fn fail_on(&self, point: AttachPoint) {
        self.inner.lock().unwrap().failing.insert(point);
    }

    pub fn is_attached(&self, point: AttachPoint) -> bool {
        self.inner.lock().unwrap().attached.contains(&point)
    }

    pub fn attached(&self) -> HashSet<AttachPoint> {
        self.inner.lock().unwrap().attached.clone()
    }

    /// Successful attach calls for `point`.
    pub fn attach_count(&self, point: AttachPoint) -> usize {
        *self
            .inner
            .lock()
            .unwrap()
            .attach_calls
            .get(&point)
            .unwrap_or(&0)
    }

    pub fn detach_count(&self, point: AttachPoint) -> usize {
        *self
            .inner
            .lock()
            .unwrap()
            .detach_calls
            .get(&point)
            .unwrap_or(&0)
    }

    pub fn total_calls(&self) -> usize {
        let state = self.inner.lock().unwrap();
        state.attach_calls.values().sum::<usize>() + state.detach_calls.values().sum::<usize>()
    }
}

impl InstrumentationPort for MockPort {
    fn attach(&mut self, point: AttachPoint) -> Result<(), AttachError> {
        let mut state = self.inner.lock().unwrap();
        if state.failing.contains(&point) {
            return Err(AttachError::Rejected(point));
        }
        assert!(state.attached.insert(point), "{point} attached twice");
        *state.attach_calls.entry(point).or_default() += 1;
        Ok(())
    }

    fn detach(&mut self, point: AttachPoint) {
        let mut state = self.inner.lock().unwrap();
        assert!(state.attached.remove(&point), "{point} was not attached");
        *state.detach_calls.entry(point).or_default() += 1;
    }
}
