use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

/// FIFO-fair spin lock.
///
/// Every `lock` call draws a ticket; the lock is granted strictly in ticket
/// order, so no waiter starves behind a stream of faster cores.
pub struct TicketLock<T> {
    /// Next ticket to hand out.
    next: AtomicUsize,
    /// Ticket currently allowed into the critical section.
    serving: AtomicUsize,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for TicketLock<T> {}

impl<T> TicketLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            next: AtomicUsize::new(0),
            serving: AtomicUsize::new(0),
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    pub fn lock(&self) -> TicketLockGuard<'_, T> {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        while self.serving.load(Ordering::Acquire) != ticket {
            spin_loop();
        }
        TicketLockGuard { lock: self }
    }

    /// Take the lock only if nobody holds or waits for it.
    #[inline]
    pub fn try_lock(&self) -> Option<TicketLockGuard<'_, T>> {
        let serving = self.serving.load(Ordering::Relaxed);
        self.next
            .compare_exchange(serving, serving + 1, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| TicketLockGuard { lock: self })
    }

    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct TicketLockGuard<'a, T> {
    lock: &'a TicketLock<T>,
}

impl<T> Deref for TicketLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for TicketLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for TicketLockGuard<'_, T> {
    fn drop(&mut self) {
        // Only the holder advances `serving`; Release hands the data to the next ticket.
        let t = self.lock.serving.load(Ordering::Relaxed);
        self.lock.serving.store(t.wrapping_add(1), Ordering::Release);
    }
}
