// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::MqttError;

/// Integer type usable as a packet identifier.
///
/// Identifiers are 16 bits on the wire; a 32 bit variant is available for
/// hosts which must disambiguate identifiers across sessions, such as
/// cluster-internal links.
pub trait IdValue: Copy + Ord {
    /// Smallest valid identifier. Zero is reserved in the protocol.
    const MIN_ID: Self;

    /// Largest valid identifier.
    const MAX_ID: Self;

    /// Get the identifier directly after `self`, or `None` at the end of
    /// the id space.
    fn next_id(self) -> Option<Self>;

    /// Get the identifier directly before `self`, or `None` at the start of
    /// the id space.
    fn prev_id(self) -> Option<Self>;
}

impl IdValue for u16 {
    const MIN_ID: Self = 1;
    const MAX_ID: Self = u16::MAX;

    fn next_id(self) -> Option<Self> {
        self.checked_add(1)
    }

    fn prev_id(self) -> Option<Self> {
        if self <= Self::MIN_ID {
            None
        } else {
            Some(self - 1)
        }
    }
}

impl IdValue for u32 {
    const MIN_ID: Self = 1;
    const MAX_ID: Self = u32::MAX;

    fn next_id(self) -> Option<Self> {
        self.checked_add(1)
    }

    fn prev_id(self) -> Option<Self> {
        if self <= Self::MIN_ID {
            None
        } else {
            Some(self - 1)
        }
    }
}

enum WaitSlot<T> {
    /// Waiting for an identifier; the waker is stored on first poll.
    Pending(Option<Waker>),

    /// An identifier was handed over but not picked up by the future yet.
    Ready(T),

    /// The manager was cleared while waiting.
    Aborted,

    /// The future consumed its result or was cancelled.
    Done,
}

struct Inner<T> {
    /// Free id space as inclusive intervals, keyed by interval start.
    free: BTreeMap<T, T>,

    /// Queued acquire requests, oldest first.
    waiters: VecDeque<Arc<Mutex<WaitSlot<T>>>>,
}

impl<T: IdValue> Inner<T> {
    fn new() -> Self {
        let mut free = BTreeMap::new();
        free.insert(T::MIN_ID, T::MAX_ID);
        Self {
            free,
            waiters: VecDeque::new(),
        }
    }

    fn acquire(&mut self) -> Option<T> {
        let (&start, &end) = self.free.iter().next()?;
        self.free.remove(&start);
        if start < end {
            // Unwrap is fine: start < end implies a successor exists.
            if let Some(next) = start.next_id() {
                self.free.insert(next, end);
            }
        }
        Some(start)
    }

    fn register(&mut self, id: T) -> bool {
        if id < T::MIN_ID {
            return false;
        }
        // Find the interval which may contain id.
        let (&start, &end) = match self.free.range(..=id).next_back() {
            Some(entry) => entry,
            None => return false,
        };
        if id > end {
            return false;
        }
        self.free.remove(&start);
        if start < id {
            if let Some(prev) = id.prev_id() {
                self.free.insert(start, prev);
            }
        }
        if id < end {
            if let Some(next) = id.next_id() {
                self.free.insert(next, end);
            }
        }
        true
    }

    fn is_used(&self, id: T) -> bool {
        if id < T::MIN_ID {
            return false;
        }
        match self.free.range(..=id).next_back() {
            Some((_start, &end)) => id > end,
            None => true,
        }
    }

    /// Put `id` back into the free set, coalescing with neighbor intervals.
    /// Releasing a free id is a no-op.
    fn insert_free(&mut self, id: T) {
        if !self.is_used(id) {
            return;
        }

        let mut start = id;
        let mut end = id;
        // Merge with the predecessor interval ending right before id.
        if let Some((&prev_start, &prev_end)) = self.free.range(..id).next_back() {
            if prev_end.next_id() == Some(id) {
                self.free.remove(&prev_start);
                start = prev_start;
            }
        }
        // Merge with the successor interval starting right after id.
        if let Some(next) = id.next_id() {
            if let Some(&next_end) = self.free.get(&next) {
                self.free.remove(&next);
                end = next_end;
            }
        }
        self.free.insert(start, end);
    }

    fn clear(&mut self) {
        self.free.clear();
        self.free.insert(T::MIN_ID, T::MAX_ID);
        for waiter in self.waiters.drain(..) {
            let mut slot = lock_ignore_poison(&waiter);
            let waker = match &mut *slot {
                WaitSlot::Pending(waker) => waker.take(),
                _ => None,
            };
            *slot = WaitSlot::Aborted;
            drop(slot);
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }

    /// Hand `id` to the oldest live waiter, or free it.
    fn release(&mut self, id: T) {
        if !self.is_used(id) {
            return;
        }
        while let Some(waiter) = self.waiters.pop_front() {
            let mut slot = lock_ignore_poison(&waiter);
            if let WaitSlot::Pending(waker) = &mut *slot {
                let waker = waker.take();
                *slot = WaitSlot::Ready(id);
                drop(slot);
                if let Some(waker) = waker {
                    waker.wake();
                }
                return;
            }
            // Cancelled waiter, skip it.
        }
        self.insert_free(id);
    }
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Packet identifier allocator.
///
/// Identifiers are tracked as a set of free intervals, so acquire, register
/// and release run in `O(log n)` of the number of intervals. A full id
/// space queues `acquire_wait()` requests in strict FIFO order; requests are
/// fulfilled as identifiers are released and may be cancelled by dropping
/// the returned future.
///
/// The manager is a cheap handle; clones share the same id space.
#[derive(Clone)]
pub struct PacketIdManager<T: IdValue = u16> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: IdValue> Default for PacketIdManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdValue> PacketIdManager<T> {
    /// Create a manager with the whole id space free.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Take the lowest free identifier, or `None` when all are in use.
    #[must_use]
    pub fn acquire(&self) -> Option<T> {
        lock_ignore_poison(&self.inner).acquire()
    }

    /// Wait until an identifier is free.
    ///
    /// Waiters are served strictly in request order. Dropping the future
    /// cancels the request; an identifier already handed to a cancelled
    /// future is passed on to the next waiter without being lost.
    #[must_use]
    pub fn acquire_wait(&self) -> AcquireWait<T> {
        let mut inner = lock_ignore_poison(&self.inner);
        if let Some(id) = inner.acquire() {
            return AcquireWait {
                manager: Arc::clone(&self.inner),
                slot: Arc::new(Mutex::new(WaitSlot::Ready(id))),
            };
        }
        let slot = Arc::new(Mutex::new(WaitSlot::Pending(None)));
        inner.waiters.push_back(Arc::clone(&slot));
        AcquireWait {
            manager: Arc::clone(&self.inner),
            slot,
        }
    }

    /// Mark an externally chosen identifier as in-use.
    ///
    /// Returns false if `id` is already in use or out of range.
    pub fn register(&self, id: T) -> bool {
        lock_ignore_poison(&self.inner).register(id)
    }

    /// Return `id` to the pool, waking the oldest waiter if any.
    /// Releasing an unknown identifier is a no-op.
    pub fn release(&self, id: T) {
        lock_ignore_poison(&self.inner).release(id);
    }

    /// Check whether `id` is currently in use.
    #[must_use]
    pub fn is_used(&self, id: T) -> bool {
        lock_ignore_poison(&self.inner).is_used(id)
    }

    /// Mark all identifiers free and cancel queued waiters with
    /// [`MqttError::OperationAborted`].
    pub fn clear(&self) {
        lock_ignore_poison(&self.inner).clear();
    }
}

/// Future returned by [`PacketIdManager::acquire_wait`].
pub struct AcquireWait<T: IdValue> {
    manager: Arc<Mutex<Inner<T>>>,
    slot: Arc<Mutex<WaitSlot<T>>>,
}

impl<T: IdValue> Future for AcquireWait<T> {
    type Output = Result<T, MqttError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock_ignore_poison(&self.slot);
        match &mut *slot {
            WaitSlot::Ready(id) => {
                let id = *id;
                *slot = WaitSlot::Done;
                Poll::Ready(Ok(id))
            }
            WaitSlot::Aborted => {
                *slot = WaitSlot::Done;
                Poll::Ready(Err(MqttError::OperationAborted))
            }
            WaitSlot::Pending(waker) => {
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
            WaitSlot::Done => Poll::Ready(Err(MqttError::OperationAborted)),
        }
    }
}

impl<T: IdValue> Drop for AcquireWait<T> {
    fn drop(&mut self) {
        let mut slot = lock_ignore_poison(&self.slot);
        match &*slot {
            // The id was assigned but never picked up; pass it to the next
            // waiter so cancellation cannot leak identifiers.
            WaitSlot::Ready(id) => {
                let id = *id;
                *slot = WaitSlot::Done;
                drop(slot);
                let mut inner = lock_ignore_poison(&self.manager);
                // The id is not in the free set while assigned, so release
                // routes it to a waiter or back into the pool.
                inner.release(id);
            }
            WaitSlot::Pending(..) => {
                // Mark cancelled; the queue entry is skipped on release.
                *slot = WaitSlot::Done;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task::spawn;

    #[test]
    fn test_acquire_release() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        assert_eq!(manager.acquire(), Some(1));
        assert_eq!(manager.acquire(), Some(2));
        assert!(manager.is_used(1));
        manager.release(1);
        assert!(!manager.is_used(1));
        assert_eq!(manager.acquire(), Some(1));
    }

    #[test]
    fn test_register() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        assert!(manager.register(42));
        assert!(!manager.register(42));
        assert!(manager.is_used(42));
        assert_eq!(manager.acquire(), Some(1));
        manager.release(42);
        assert!(manager.register(42));
    }

    #[test]
    fn test_register_zero_rejected() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        assert!(!manager.register(0));
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        manager.release(7);
        assert_eq!(manager.acquire(), Some(1));
    }

    #[test]
    fn test_exhaustion() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        for expected in 1..=u16::MAX {
            assert_eq!(manager.acquire(), Some(expected));
        }
        assert_eq!(manager.acquire(), None);
        manager.release(17);
        assert_eq!(manager.acquire(), Some(17));
    }

    #[test]
    fn test_acquire_wait_fifo() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        for _ in 1..=u16::MAX {
            let _id = manager.acquire();
        }

        let mut first = spawn(manager.acquire_wait());
        let mut second = spawn(manager.acquire_wait());
        assert!(first.poll().is_pending());
        assert!(second.poll().is_pending());

        manager.release(100);
        assert_eq!(first.poll(), std::task::Poll::Ready(Ok(100)));
        assert!(second.poll().is_pending());

        manager.release(200);
        assert_eq!(second.poll(), std::task::Poll::Ready(Ok(200)));
    }

    #[test]
    fn test_acquire_wait_cancel_hands_over() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        for _ in 1..=u16::MAX {
            let _id = manager.acquire();
        }

        let mut first = spawn(manager.acquire_wait());
        let mut second = spawn(manager.acquire_wait());
        assert!(first.poll().is_pending());
        assert!(second.poll().is_pending());

        // The id assigned to the cancelled waiter must reach the next one.
        manager.release(9);
        drop(first);
        assert_eq!(second.poll(), std::task::Poll::Ready(Ok(9)));
    }

    #[test]
    fn test_clear_aborts_waiters() {
        let manager: PacketIdManager<u16> = PacketIdManager::new();
        for _ in 1..=u16::MAX {
            let _id = manager.acquire();
        }
        let mut waiter = spawn(manager.acquire_wait());
        assert!(waiter.poll().is_pending());

        manager.clear();
        assert_eq!(
            waiter.poll(),
            std::task::Poll::Ready(Err(MqttError::OperationAborted))
        );
        assert_eq!(manager.acquire(), Some(1));
    }

    #[test]
    fn test_u32_width() {
        let manager: PacketIdManager<u32> = PacketIdManager::new();
        assert_eq!(manager.acquire(), Some(1));
        assert!(manager.register(0x0001_0000));
        assert!(manager.is_used(0x0001_0000));
    }
}
