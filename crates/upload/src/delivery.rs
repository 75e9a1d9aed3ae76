use std::sync::Mutex;

use tracing::debug;

type Callback<T> = Box<dyn FnOnce(T) + Send>;

/// Hands a terminal value to a callback exactly once.
///
/// The first value wins; later ones are dropped. A value produced before a
/// callback is registered is held until one is.
pub(crate) struct Delivery<T> {
    slot: Mutex<Slot<T>>,
}

struct Slot<T> {
    finished: bool,
    callback: Option<Callback<T>>,
    pending: Option<T>,
}

impl<T> Delivery<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                finished: false,
                callback: None,
                pending: None,
            }),
        }
    }

    /// Registers the callback, invoking it right away if the value is ready.
    pub fn set_callback(&self, callback: Callback<T>) {
        let ready = {
            let Ok(mut slot) = self.slot.lock() else {
                return;
            };
            match slot.pending.take() {
                Some(value) => Some(value),
                None if slot.finished => {
                    debug!("result already delivered, callback ignored");
                    return;
                }
                None => {
                    slot.callback = Some(callback);
                    return;
                }
            }
        };
        if let Some(value) = ready {
            callback(value);
        }
    }

    /// Delivers `value` unless one was delivered before.
    ///
    /// `on_accept` runs under the lock when the value is accepted, before any
    /// callback is invoked. Returns `false` if the value was dropped.
    pub fn deliver(&self, value: T, on_accept: impl FnOnce()) -> bool {
        let callback = {
            let Ok(mut slot) = self.slot.lock() else {
                return false;
            };
            if slot.finished {
                return false;
            }
            slot.finished = true;
            on_accept();
            match slot.callback.take() {
                Some(callback) => callback,
                None => {
                    slot.pending = Some(value);
                    return true;
                }
            }
        };
        callback(value);
        true
    }

    /// Returns `true` once a value was accepted.
    pub fn is_finished(&self) -> bool {
        self.slot.lock().map(|slot| slot.finished).unwrap_or(true)
    }
}
