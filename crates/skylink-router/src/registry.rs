//! Subscription registry: (kind, optional room) → ordered listeners.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use skylink_protocol::{Envelope, MessageKind, RoomId};
use tracing::trace;

/// A consumer callback.
///
/// Listeners are compared by `Arc` identity: pass the same `Listener`
/// (or a clone of it) to [`Registry::unsubscribe`] to remove it.
pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// What a subscription is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub kind: MessageKind,
    /// `None` matches every room, including envelopes with no room.
    pub room: Option<RoomId>,
}

impl RouteKey {
    /// Every envelope of `kind`.
    pub fn kind(kind: impl Into<MessageKind>) -> Self {
        Self {
            kind: kind.into(),
            room: None,
        }
    }

    /// Envelopes of `kind` routed to `room` only.
    pub fn room(kind: impl Into<MessageKind>, room: RoomId) -> Self {
        Self {
            kind: kind.into(),
            room: Some(room),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.room {
            Some(room) => write!(f, "{}@{}", self.kind, room),
            None => write!(f, "{}", self.kind),
        }
    }
}

struct Registration {
    id: u64,
    room: Option<RoomId>,
    listener: Listener,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    /// Registrations per kind, in registration order.
    by_kind: HashMap<MessageKind, Vec<Registration>>,
}

/// Thread-safe map from [`RouteKey`] to listeners.
///
/// Clones share the same registrations. The lock is only held to read or
/// change the map, never while a listener runs, so listeners may
/// subscribe and unsubscribe freely.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `key`.
    ///
    /// The same listener may be registered more than once, for the same
    /// or different keys; each registration is independent and delivers
    /// separately.
    pub fn subscribe(&self, key: RouteKey, listener: Listener) -> SubscriptionHandle {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .by_kind
            .entry(key.kind.clone())
            .or_default()
            .push(Registration {
                id,
                room: key.room.clone(),
                listener,
            });
        trace!(%key, id, "listener subscribed");

        SubscriptionHandle {
            registry: Arc::downgrade(&self.inner),
            id,
            key,
        }
    }

    /// Removes registrations under exactly `key`.
    ///
    /// With `Some(listener)`, removes every registration of that listener
    /// under `key`. With `None`, removes all of them. A type-only key does
    /// not touch room-scoped registrations and vice versa.
    ///
    /// Returns how many registrations were removed.
    pub fn unsubscribe(&self, key: &RouteKey, listener: Option<&Listener>) -> usize {
        let mut inner = self.lock();
        let Some(regs) = inner.by_kind.get_mut(&key.kind) else {
            return 0;
        };

        let before = regs.len();
        regs.retain(|reg| {
            let same_key = reg.room == key.room;
            let same_listener =
                listener.is_none_or(|l| Arc::ptr_eq(l, &reg.listener));
            !(same_key && same_listener)
        });
        let removed = before - regs.len();

        if regs.is_empty() {
            inner.by_kind.remove(&key.kind);
        }
        trace!(%key, removed, "listeners unsubscribed");
        removed
    }

    /// Snapshot of the listeners an envelope of `kind` for `room` reaches,
    /// in registration order.
    pub fn matching(&self, kind: &MessageKind, room: Option<&RoomId>) -> Vec<Listener> {
        let inner = self.lock();
        inner
            .by_kind
            .get(kind)
            .map(|regs| {
                regs.iter()
                    .filter(|reg| match &reg.room {
                        None => true,
                        Some(wanted) => Some(wanted) == room,
                    })
                    .map(|reg| Arc::clone(&reg.listener))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.lock().by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.lock().by_kind.clear();
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<RegistryInner>) -> MutexGuard<'_, RegistryInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Removes one registration made by [`Registry::subscribe`].
///
/// Holds only a weak reference, so it never keeps the registry alive and
/// is harmless to use after the client is gone. Dropping the handle does
/// not unsubscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    registry: Weak<Mutex<RegistryInner>>,
    id: u64,
    key: RouteKey,
}

impl SubscriptionHandle {
    /// The key this registration was made under.
    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    /// Removes the registration.
    ///
    /// Returns `true` the first time, `false` on every later call or if
    /// the registration was already removed some other way.
    pub fn unsubscribe(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut inner = lock_inner(&inner);
        let Some(regs) = inner.by_kind.get_mut(&self.key.kind) else {
            return false;
        };
        let Some(pos) = regs.iter().position(|reg| reg.id == self.id) else {
            return false;
        };
        regs.remove(pos);
        if regs.is_empty() {
            inner.by_kind.remove(&self.key.kind);
        }
        trace!(key = %self.key, id = self.id, "subscription handle released");
        true
    }
}
