//! In-memory transport implementation.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use super::{EndpointDiscovery, Transport, TransportEvent};
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Default)]
struct Inner {
    open: bool,
    pending: VecDeque<TransportEvent>,
    sent: Vec<String>,
    opened: Vec<String>,
    refuse_next: Option<String>,
}

/// Scripted transport for testing and offline use.
///
/// Discovery runs synchronously inside `open`; its result is queued and
/// reported by the next `poll`, like a real connection would be. The
/// paired [`MemoryTransportHandle`] plays the server side.
#[derive(Debug)]
pub struct MemoryTransport {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryTransport {
    /// Create a new transport and the handle that drives it.
    pub fn new() -> (Self, MemoryTransportHandle) {
        let inner = Rc::new(RefCell::new(Inner::default()));
        (
            Self {
                inner: inner.clone(),
            },
            MemoryTransportHandle { inner },
        )
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, discovery: Arc<dyn EndpointDiscovery>) {
        let mut inner = self.inner.borrow_mut();
        let event = match discovery.discover() {
            Ok(url) => match inner.refuse_next.take() {
                Some(reason) => TransportEvent::Failed(SyncError::Connection(reason)),
                None => {
                    inner.open = true;
                    inner.opened.push(url.clone());
                    TransportEvent::Opened { url }
                }
            },
            Err(e) => TransportEvent::Failed(e),
        };
        inner.pending.push_back(event);
    }

    fn send(&mut self, frame: String) -> SyncResult<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.open {
            return Err(SyncError::DroppedSend);
        }
        inner.sent.push(frame);
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.inner.borrow_mut().pending.drain(..).collect()
    }

    fn close(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.open = false;
        inner.pending.clear();
    }
}

/// Server-side controls for a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryTransportHandle {
    inner: Rc<RefCell<Inner>>,
}

impl MemoryTransportHandle {
    /// Deliver a text frame to the client.
    pub fn push_frame(&self, frame: impl Into<String>) {
        self.inner
            .borrow_mut()
            .pending
            .push_back(TransportEvent::Frame(frame.into()));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.open = false;
        inner.pending.push_back(TransportEvent::Closed);
    }

    /// Drop the connection with an error.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut inner = self.inner.borrow_mut();
        inner.open = false;
        inner
            .pending
            .push_back(TransportEvent::Failed(SyncError::Connection(reason.into())));
    }

    /// Make the next `open` fail after a successful discovery.
    pub fn refuse_next_open(&self, reason: impl Into<String>) {
        self.inner.borrow_mut().refuse_next = Some(reason.into());
    }

    pub fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    /// Frames the client has sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.inner.borrow().sent.clone()
    }

    /// Take the frames the client has sent (drains).
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.borrow_mut().sent)
    }

    /// URLs of every successful open, in order.
    pub fn opened(&self) -> Vec<String> {
        self.inner.borrow().opened.clone()
    }
}
