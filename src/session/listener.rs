use crate::audio::frame::OutboundMediaBuffer;
use crate::session::state::SessionEnd;
use std::sync::{Mutex, MutexGuard};

/// Receives what a session sends back to the call transport.
pub trait SessionListener: Send + Sync {
    /// One outbound buffer, in playback order.
    fn on_outbound_media(&self, buffer: OutboundMediaBuffer);

    /// Called exactly once, after every session resource was released.
    fn on_session_ended(&self, _end: &SessionEnd) {}
}

/// Listener that keeps everything it receives.
#[derive(Debug, Default)]
pub struct CollectingListener {
    buffers: Mutex<Vec<OutboundMediaBuffer>>,
    ends: Mutex<Vec<SessionEnd>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers(&self) -> Vec<OutboundMediaBuffer> {
        lock(&self.buffers).clone()
    }

    pub fn buffer_count(&self) -> usize {
        lock(&self.buffers).len()
    }

    /// Removes and returns the buffers received so far.
    pub fn take_buffers(&self) -> Vec<OutboundMediaBuffer> {
        std::mem::take(&mut *lock(&self.buffers))
    }

    pub fn ends(&self) -> Vec<SessionEnd> {
        lock(&self.ends).clone()
    }
}

impl SessionListener for CollectingListener {
    fn on_outbound_media(&self, buffer: OutboundMediaBuffer) {
        lock(&self.buffers).push(buffer);
    }

    fn on_session_ended(&self, end: &SessionEnd) {
        lock(&self.ends).push(end.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::EndReason;
    use std::time::Duration;

    #[test]
    fn test_collects_buffers_and_ends() {
        let listener = CollectingListener::new();
        listener.on_outbound_media(OutboundMediaBuffer {
            data: vec![0; 4],
            duration: Duration::from_millis(20),
            timestamp: 0,
        });
        listener.on_session_ended(&SessionEnd::new(EndReason::Shutdown, None));

        assert_eq!(listener.buffer_count(), 1);
        assert_eq!(listener.ends().len(), 1);
        assert_eq!(listener.take_buffers().len(), 1);
        assert_eq!(listener.buffer_count(), 0);
    }
}
