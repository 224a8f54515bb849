/// Correlation of outstanding requests with their eventual replies.
///
/// Every registered key owns a one-shot slot. The slot is consumed by the
/// first matching `resolve`, by the waiter's deadline, or by dropping the
/// waiter, whichever comes first. Replies for keys with no slot are dropped.
use crate::error::{ErrorCode, HandshakeError};
use crate::timer::{Timer, with_deadline};
use futures::channel::oneshot;
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

struct Slot<V> {
    generation: u64,
    tx: oneshot::Sender<V>,
}

struct Slots<K, V> {
    next_generation: u64,
    by_key: HashMap<K, Slot<V>>,
}

pub struct PendingMap<K, V> {
    inner: Rc<RefCell<Slots<K, V>>>,
}

impl<K, V> Clone for PendingMap<K, V> {
    fn clone(&self) -> Self {
        PendingMap {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Default for PendingMap<K, V> {
    fn default() -> Self {
        PendingMap {
            inner: Rc::new(RefCell::new(Slots {
                next_generation: 0,
                by_key: HashMap::new(),
            })),
        }
    }
}

impl<K, V> PendingMap<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// At most one outstanding slot per key
    pub fn register(&self, key: K) -> Result<PendingReply<K, V>, HandshakeError> {
        let mut slots = self.inner.borrow_mut();
        if slots.by_key.contains_key(&key) {
            return Err(ErrorCode::ConnectInProgress.into());
        }

        let generation = slots.next_generation;
        slots.next_generation += 1;

        let (tx, rx) = oneshot::channel();
        slots.by_key.insert(key.clone(), Slot { generation, tx });
        debug!("pending: registered {:?}", key);

        Ok(PendingReply {
            key,
            generation,
            rx,
            owner: self.clone(),
        })
    }

    /// Deliver `value` to the slot for `key` and remove it.
    /// Returns false when nothing was waiting.
    pub fn resolve(&self, key: &K, value: V) -> bool {
        let slot = self.inner.borrow_mut().by_key.remove(key);
        match slot {
            Some(slot) => {
                // receiver may already be gone if the waiter was dropped mid-flight
                let _ = slot.tx.send(value);
                debug!("pending: resolved {:?}", key);
                true
            }
            None => {
                debug!("pending: no waiter for {:?}, dropping", key);
                false
            }
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.borrow().by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&self, key: &K, generation: u64) {
        let mut slots = self.inner.borrow_mut();
        if slots
            .by_key
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            slots.by_key.remove(key);
        }
    }
}

/// The waiting half of a registered slot. Dropping it releases the slot.
pub struct PendingReply<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    key: K,
    generation: u64,
    rx: oneshot::Receiver<V>,
    owner: PendingMap<K, V>,
}

impl<K, V> PendingReply<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub async fn wait(mut self, timer: &dyn Timer, deadline: Duration) -> Result<V, HandshakeError> {
        match with_deadline(timer, deadline, &mut self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(oneshot::Canceled)) => Err(ErrorCode::UnknownError.into()),
            Err(timeout) => {
                warn!("pending: {:?} gave no reply within {:?}", self.key, deadline);
                Err(timeout)
            }
        }
    }
}

impl<K, V> Drop for PendingReply<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        self.owner.forget(&self.key, self.generation);
    }
}
