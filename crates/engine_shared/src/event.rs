// crates/engine_shared/src/event.rs

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

use crate::hash::{fnv1a, layout_fingerprint};

/// Dispatch key of an event category.
///
/// The FNV-1a hash of the category's stable name. Plugins are compiled on
/// their own, so they can introduce categories the host has never heard of;
/// a closed enum would not allow that. Collisions are not prevented by the
/// hash itself, the bus refuses a second name for an id it has already seen.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeId(u64);

impl EventTypeId {
    pub const fn from_name(name: &str) -> Self {
        Self(fnv1a(name.as_bytes()))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn of<E: Event>() -> Self {
        E::ID
    }
}

impl fmt::Debug for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventTypeId({:#018x})", self.0)
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// An immutable payload published on the bus.
///
/// `NAME` must be unique across the host and every plugin, so namespace it
/// (`"engine.lifecycle.update"`, `"my_plugin.spawned"`). It names one type:
/// changing the fields of an event without renaming it is only caught when
/// the size or alignment changes too.
pub trait Event: Sized + 'static {
    const NAME: &'static str;
    const ID: EventTypeId = EventTypeId::from_name(Self::NAME);
    const LAYOUT: u64 = layout_fingerprint::<Self>(Self::NAME);
}

/// Borrowed, type-erased view of an event while it is being dispatched.
///
/// Carries the payload as an untyped pointer plus the publisher's
/// `Event::LAYOUT`, so a module built separately from the publisher can
/// still read it.
#[derive(Clone, Copy)]
pub struct EventRef<'a> {
    id: EventTypeId,
    name: &'static str,
    layout: u64,
    payload: NonNull<()>,
    _borrow: PhantomData<&'a ()>,
}

impl<'a> EventRef<'a> {
    pub fn new<E: Event>(event: &'a E) -> Self {
        Self {
            id: E::ID,
            name: E::NAME,
            layout: E::LAYOUT,
            payload: NonNull::from(event).cast(),
            _borrow: PhantomData,
        }
    }

    pub fn type_id(&self) -> EventTypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<E: Event>(&self) -> bool {
        self.get::<E>().is_some()
    }

    /// Typed access to the payload. `None` when the event is of another
    /// category, or of the same category with a different layout.
    pub fn get<E: Event>(&self) -> Option<&'a E> {
        if self.id != E::ID || self.layout != E::LAYOUT {
            return None;
        }
        // SAFETY: `new::<X>` borrowed an `X` for `'a`, and `X` has the same
        // name, size and alignment as `E`, which by the `Event` contract
        // makes it the same type.
        Some(unsafe { self.payload.cast::<E>().as_ref() })
    }
}

impl fmt::Debug for EventRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRef")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Anything that wants to receive dispatched events.
///
/// Handlers take `&self`: a handler may publish, subscribe or unsubscribe
/// while it runs, so listeners keep their mutable state in `Cell`/`RefCell`.
/// Handlers must not block, there is nothing to preempt them.
pub trait EventListener {
    fn on_event(&self, event: &EventRef<'_>);
}

/// Identity of a listener on the bus: the address of its shared allocation.
///
/// Stable for as long as any `Rc`/`Weak` to the listener exists, and the bus
/// keeps a `Weak` for every entry it holds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(usize);

impl ListenerId {
    pub fn of<L: EventListener + ?Sized>(listener: &Rc<L>) -> Self {
        Self(Rc::as_ptr(listener) as *const () as usize)
    }

    pub fn of_weak<L: EventListener + ?Sized>(listener: &Weak<L>) -> Self {
        Self(Weak::as_ptr(listener) as *const () as usize)
    }
}

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping(u32);
    impl Event for Ping {
        const NAME: &'static str = "test.ping";
    }

    struct Pong;
    impl Event for Pong {
        const NAME: &'static str = "test.pong";
    }

    #[test]
    fn type_id_is_the_hash_of_the_name() {
        assert_eq!(Ping::ID, EventTypeId::from_name("test.ping"));
        assert_ne!(Ping::ID, Pong::ID);
        assert_eq!(EventTypeId::of::<Pong>().raw(), fnv1a(b"test.pong"));
    }

    #[test]
    fn event_ref_downcasts_only_to_its_own_category() {
        let ping = Ping(7);
        let event = EventRef::new(&ping);

        assert_eq!(event.name(), "test.ping");
        assert_eq!(event.get::<Ping>().map(|p| p.0), Some(7));
        assert!(event.get::<Pong>().is_none());
        assert!(!event.is::<Pong>());
    }

    #[test]
    fn payload_is_readable_by_a_separately_built_copy_of_the_type() {
        // Same name and layout, distinct `TypeId`: what a plugin built with
        // other flags sees of a host event.
        struct HostTick {
            frame: u64,
        }
        struct PluginTick {
            frame: u64,
        }
        impl Event for HostTick {
            const NAME: &'static str = "test.tick";
        }
        impl Event for PluginTick {
            const NAME: &'static str = "test.tick";
        }

        let tick = HostTick { frame: 41 };
        let event = EventRef::new(&tick);
        assert_eq!(event.get::<PluginTick>().map(|t| t.frame), Some(41));
        assert_eq!(event.get::<HostTick>().map(|t| t.frame), Some(41));
    }

    #[test]
    fn changed_layout_under_the_same_name_is_refused() {
        struct Narrow(u32);
        struct Wide(u64);
        impl Event for Narrow {
            const NAME: &'static str = "test.versioned";
        }
        impl Event for Wide {
            const NAME: &'static str = "test.versioned";
        }

        let narrow = Narrow(3);
        let event = EventRef::new(&narrow);
        assert_eq!(Narrow::ID, Wide::ID);
        assert!(event.get::<Wide>().is_none());
        assert_eq!(event.get::<Narrow>().map(|n| n.0), Some(3));
    }

    #[test]
    fn listener_id_is_shared_between_rc_and_weak() {
        struct Nop;
        impl EventListener for Nop {
            fn on_event(&self, _event: &EventRef<'_>) {}
        }

        let strong: Rc<dyn EventListener> = Rc::new(Nop);
        let weak = Rc::downgrade(&strong);
        assert_eq!(ListenerId::of(&strong), ListenerId::of_weak(&weak));
    }
}
