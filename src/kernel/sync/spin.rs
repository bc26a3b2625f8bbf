// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Spinlock Implementation
//!
//! Spinlocks are used when the expected wait time is very short: signal
//! state, handle table slots, registries. They come from the `spin` crate;
//! this module only fixes the names the rest of the kernel uses.

/// A simple spinlock
pub type SpinMutex<T> = spin::Mutex<T>;

/// RAII guard for a SpinMutex
pub type SpinMutexGuard<'a, T> = spin::MutexGuard<'a, T>;

/// Type alias for SpinMutex as SpinLock for compatibility
pub type SpinLock<T> = SpinMutex<T>;

/// Write-once cell for back-pointers set after construction
pub type SpinOnce<T> = spin::Once<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spin_mutex_exclusion() {
        let counter = Arc::new(SpinMutex::new(0u64));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*counter.lock(), 4000);
    }

    #[test]
    fn test_try_lock() {
        let m = SpinMutex::new(1);
        let guard = m.lock();
        assert!(m.try_lock().is_none());
        drop(guard);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn test_once_keeps_first_value() {
        let once = SpinOnce::new();
        assert!(once.get().is_none());
        once.call_once(|| 1);
        once.call_once(|| 2);
        assert_eq!(once.get(), Some(&1));
    }
}
