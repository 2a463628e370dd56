//! The two suspension points the core uses: a per-bus device-list lock and
//! a single global bus-list lock. Both are plain `spin::Mutex` guards --
//! this crate runs with interrupts typically masked during enumeration, so
//! a spinlock is the correct primitive rather than a blocking mutex.
//! Lock order is always global-bus-list before any per-bus device-list, to
//! match the handoff in [`crate::enumerator::remove_bus`].

use spin::{Mutex, MutexGuard};

/// Guards one bus's logical-device list and Read Data Port ownership.
pub struct DeviceListLock<T> {
    inner: Mutex<T>,
}

impl<T> DeviceListLock<T> {
    pub const fn new(value: T) -> Self {
        DeviceListLock { inner: Mutex::new(value) }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}

/// Guards the process-wide list of enumerated buses, used only when a bus
/// is added or removed and when deciding who inherits Read Data Port
/// ownership on removal.
pub struct BusListLock<T> {
    inner: Mutex<T>,
}

impl<T> BusListLock<T> {
    pub const fn new(value: T) -> Self {
        BusListLock { inner: Mutex::new(value) }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}
