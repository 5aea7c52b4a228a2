use core::cell::RefCell;

use critical_section::Mutex;

/// Holds the latest value written by a producer. Every access happens
/// inside a critical section, so a reader never observes a half-written
/// value, even if the producer runs in an interrupt.
pub struct Watch<T> {
    state: Mutex<RefCell<State<T>>>,
}

impl<T: Clone> Default for Watch<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct State<T> {
    value: Option<T>,
    msg_id: usize,
}

impl<T: Clone> Watch<T> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                value: None,
                msg_id: 0,
            })),
        }
    }

    pub const fn sender(&self) -> Sender<'_, T> {
        Sender { watch: self }
    }

    pub const fn receiver(&self) -> Receiver<'_, T> {
        Receiver {
            watch: self,
            msg_id: 0,
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.inner_getter(None).map(|(value, _)| value)
    }

    pub fn get_msg_id(&self) -> usize {
        self.with_state(|state| state.msg_id)
    }

    pub fn send(&self, value: T) {
        self.with_state(|state| {
            state.msg_id = state.msg_id.wrapping_add(1);
            state.value = Some(value);
        });
    }

    fn modify(&self, value: impl FnOnce(&mut T)) {
        self.with_state(|state| {
            if let Some(inner) = &mut state.value {
                state.msg_id = state.msg_id.wrapping_add(1);
                value(inner);
            }
        });
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<T>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    fn inner_getter(&self, msg_id: Option<usize>) -> Option<(T, usize)> {
        self.with_state(|state| {
            // Wrapping comparison, a receiver exactly 2^usize::BITS messages
            // behind would miss that one message.
            if msg_id.is_some_and(|msg_id| state.msg_id.wrapping_sub(msg_id) == 0) {
                return None;
            }

            let value = state.value.as_ref()?;
            Some((value.clone(), state.msg_id))
        })
    }
}

pub struct Receiver<'a, T> {
    watch: &'a Watch<T>,
    msg_id: usize,
}

impl<T: Clone> Receiver<'_, T> {
    /// The latest value, if it was sent after the last one this receiver
    /// saw.
    pub fn try_changed(&mut self) -> Option<T> {
        self.watch
            .inner_getter(Some(self.msg_id))
            .map(|(value, msg_id)| {
                self.msg_id = msg_id;
                value
            })
    }

    /// The latest value, whether or not it was seen before.
    pub fn try_get(&mut self) -> Option<T> {
        self.watch.inner_getter(None).map(|(value, msg_id)| {
            self.msg_id = msg_id;
            value
        })
    }
}

pub struct Sender<'a, T> {
    watch: &'a Watch<T>,
}

impl<T: Clone> Sender<'_, T> {
    pub fn send(&mut self, value: T) {
        self.watch.send(value);
    }

    pub fn modify(&mut self, value: impl FnOnce(&mut T)) {
        self.watch.modify(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_various() {
        static WATCH: Watch<i32> = Watch::new();

        let mut sender = WATCH.sender();
        let mut receiver = WATCH.receiver();

        assert_eq!(receiver.try_changed(), None);
        assert_eq!(receiver.try_get(), None);

        sender.send(10);

        assert_eq!(receiver.try_changed(), Some(10));
        assert_eq!(receiver.try_changed(), None);
        assert_eq!(receiver.try_get(), Some(10));

        sender.send(20);

        assert_eq!(receiver.try_get(), Some(20));
        assert_eq!(receiver.try_changed(), None);

        sender.modify(|value| *value += 5);
        assert_eq!(receiver.try_changed(), Some(25));
        assert_eq!(WATCH.get_msg_id(), 3);
    }

    #[test]
    fn modify_before_send_is_ignored() {
        let watch = Watch::<u8>::new();
        watch.sender().modify(|value| *value = 1);
        assert_eq!(watch.try_get(), None);
        assert_eq!(watch.get_msg_id(), 0);
    }

    #[test]
    fn receivers_track_independently() {
        let watch = Watch::new();
        let mut first = watch.receiver();
        let mut second = watch.receiver();
        watch.send([1.0f32, 2.0]);
        assert_eq!(first.try_changed(), Some([1.0, 2.0]));
        assert_eq!(second.try_changed(), Some([1.0, 2.0]));
        assert_eq!(first.try_changed(), None);
    }
}
