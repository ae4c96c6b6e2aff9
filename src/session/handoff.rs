//! Single-slot handoff between the inference loop and the render loop.

use std::sync::{Arc, Mutex};

use crate::gestures::Gesture;

/// Holds at most one pending stable gesture; a newer publish overwrites an
/// unread one, so the render side always sees the latest value.
#[derive(Debug, Clone, Default)]
pub struct GestureSlot {
    inner: Arc<Mutex<Option<Gesture>>>,
}

impl GestureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, g: Gesture) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(g);
    }

    pub fn take(&self) -> Option<Gesture> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
