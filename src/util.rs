use std::task;
use std::vec;

/// Wakes every task that enrolled since the last notification. Used to
/// resolve "wait for the next stamp" futures.
pub struct Notifier {
    wakers: parking_lot::Mutex<vec::Vec<task::Waker>>,
}

impl Notifier {
    pub fn new() -> Notifier {
        Notifier {
            wakers: parking_lot::Mutex::new(vec::Vec::new()),
        }
    }

    pub fn notify(&self) {
        /* take the wakers out first so a woken task that re-enrolls can't deadlock us */
        let wakers = std::mem::take(&mut *self.wakers.lock());
        for w in wakers {
            w.wake();
        }
    }

    pub fn enroll(&self, cx: &task::Context) {
        let waker = cx.waker();
        let mut wakers = self.wakers.lock();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    pub fn enrolled(&self) -> usize {
        self.wakers.lock().len()
    }
}

impl Default for Notifier {
    fn default() -> Notifier {
        Self::new()
    }
}

impl std::ops::Drop for Notifier {
    fn drop(&mut self) {
        self.notify();
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("enrolled", &self.enrolled())
            .finish()
    }
}
