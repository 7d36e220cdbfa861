use std::sync::atomic::{AtomicU64, Ordering};

/// Guards a view against applying a superseded response.
///
/// Each load takes a ticket with [`RequestGeneration::begin`]; the result is
/// applied only while [`RequestGeneration::is_current`] holds for that ticket.
#[derive(Debug, Default)]
pub struct RequestGeneration {
    current: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl RequestGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load, superseding every earlier ticket
    pub fn begin(&self) -> Ticket {
        Ticket(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Supersede outstanding tickets without starting a load (view closed)
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.0
    }

    /// Return `value` only if `ticket` is still current
    pub fn apply<T>(&self, ticket: Ticket, value: T) -> Option<T> {
        self.is_current(ticket).then_some(value)
    }
}
