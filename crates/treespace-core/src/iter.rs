//! Resource-scoped result iteration
//!
//! A cursor holds a lease on its treespace for as long as it is open.
//! `close` gives the lease back exactly once no matter how often it is
//! called; exhaustion and drop close implicitly.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::query::{NodeSelection, QueryMatch};

/// Forward-only sequence that must be released when the caller is done
pub trait ClosableIterator: Iterator {
    /// Release held resources; safe to call any number of times
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Boxed cursor as handed out by a treespace
pub type Cursor = Box<dyn ClosableIterator<Item = QueryMatch> + Send>;

/// Counted claim on a shared open-cursor gauge
#[derive(Debug)]
pub struct CursorLease {
    gauge: Arc<AtomicUsize>,
}

impl CursorLease {
    pub fn acquire(gauge: &Arc<AtomicUsize>) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self {
            gauge: Arc::clone(gauge),
        }
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cursor over the matches of one query against one snapshot
pub struct QueryCursor {
    selection: Option<NodeSelection>,
    lease: Option<CursorLease>,
    version: u64,
}

impl QueryCursor {
    pub fn new(selection: NodeSelection, lease: CursorLease, version: u64) -> Self {
        Self {
            selection: Some(selection),
            lease: Some(lease),
            version,
        }
    }

    /// Data tree version the cursor reads
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Iterator for QueryCursor {
    type Item = QueryMatch;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.selection.as_mut()?.next();
        if next.is_none() {
            self.close();
        }
        next
    }
}

impl ClosableIterator for QueryCursor {
    fn close(&mut self) {
        self.selection = None;
        if self.lease.take().is_some() {
            tracing::trace!(version = self.version, "cursor released");
        }
    }

    fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

impl Drop for QueryCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cursor for result sets known to be empty; holds nothing
pub struct EmptyCursor<T> {
    closed: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T> EmptyCursor<T> {
    pub fn new() -> Self {
        Self {
            closed: false,
            _item: PhantomData,
        }
    }
}

impl<T> Default for EmptyCursor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Iterator for EmptyCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        None
    }
}

impl<T> ClosableIterator for EmptyCursor<T> {
    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
