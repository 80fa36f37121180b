use kernel_sync::TicketLock;

/// The system tick counter.
///
/// Advanced by the timer path; read by the frame allocator (while it holds
/// its own lock) to stamp the start tick of tracked allocations.
pub struct Ticks {
    ticks: TicketLock<u64>,
}

impl Default for Ticks {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticks {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks: TicketLock::new(0),
        }
    }

    /// Advance by one tick and return the new value.
    pub fn tick(&self) -> u64 {
        self.ticks.with_lock(|t| {
            *t = t.wrapping_add(1);
            *t
        })
    }

    /// Current tick.
    #[must_use]
    pub fn now(&self) -> u64 {
        *self.ticks.lock()
    }
}
