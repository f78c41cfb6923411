// crates/engine_shared/src/bus.rs

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{error, warn};

use crate::event::{Event, EventListener, EventRef, EventTypeId, ListenerId};

type Category = HashMap<ListenerId, Weak<dyn EventListener>>;

/// Synchronous publish/subscribe dispatcher keyed by `EventTypeId`.
///
/// The bus never owns a listener, it only holds `Weak` references. Every
/// method takes `&self` so that handlers can (un)subscribe and publish while
/// a dispatch is in flight.
#[derive(Default)]
pub struct EventBus {
    categories: RefCell<HashMap<EventTypeId, Category>>,
    names: RefCell<HashMap<EventTypeId, &'static str>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener` to the set for `type_id`.
    ///
    /// Returns `false` for a dead (or never-alive) listener and for a
    /// listener that is already in the set.
    pub fn subscribe(&self, listener: &Weak<dyn EventListener>, type_id: EventTypeId) -> bool {
        if listener.strong_count() == 0 {
            return false;
        }

        let id = ListenerId::of_weak(listener);
        let mut categories = self.categories.borrow_mut();
        match categories.entry(type_id).or_default().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(listener.clone());
                true
            }
        }
    }

    /// Typed subscription. Also records `E::NAME` for the category and
    /// refuses the subscription if another name already hashed to the same id.
    pub fn subscribe_to<E: Event>(&self, listener: &Weak<dyn EventListener>) -> bool {
        self.register_name(E::ID, E::NAME) && self.subscribe(listener, E::ID)
    }

    pub fn unsubscribe(&self, listener: ListenerId, type_id: EventTypeId) -> bool {
        let mut categories = self.categories.borrow_mut();
        let Some(category) = categories.get_mut(&type_id) else {
            return false;
        };

        let removed = category.remove(&listener).is_some();
        if category.is_empty() {
            categories.remove(&type_id);
        }
        removed
    }

    pub fn unsubscribe_from<E: Event>(&self, listener: ListenerId) -> bool {
        self.unsubscribe(listener, E::ID)
    }

    /// Removes `listener` from every category. Returns how many it was in.
    pub fn unsubscribe_all(&self, listener: ListenerId) -> usize {
        let mut removed = 0;
        self.categories.borrow_mut().retain(|_, category| {
            if category.remove(&listener).is_some() {
                removed += 1;
            }
            !category.is_empty()
        });
        removed
    }

    pub fn is_subscribed(&self, listener: ListenerId, type_id: EventTypeId) -> bool {
        self.categories
            .borrow()
            .get(&type_id)
            .is_some_and(|category| category.contains_key(&listener))
    }

    pub fn listener_count(&self, type_id: EventTypeId) -> usize {
        self.categories
            .borrow()
            .get(&type_id)
            .map_or(0, |category| category.len())
    }

    /// Name recorded for `type_id` by a typed subscribe or publish, if any.
    pub fn category_name(&self, type_id: EventTypeId) -> Option<&'static str> {
        self.names.borrow().get(&type_id).copied()
    }

    /// Publishes `event` to every listener subscribed to `E`.
    /// Returns the number of handlers that ran to completion.
    pub fn publish<E: Event>(&self, event: &E) -> usize {
        if !self.register_name(E::ID, E::NAME) {
            return 0;
        }
        self.dispatch(EventRef::new(event))
    }

    /// Type-erased publish, for events whose concrete type the caller only
    /// knows through an `EventRef`.
    ///
    /// The listener set is snapshotted (ids only) before the first call.
    /// A listener removed while the dispatch is running is skipped; one added
    /// while it is running first hears the next publish. A handler that
    /// panics is logged and unsubscribed from every category.
    ///
    /// A plugin must never uninstall itself from inside its own handler:
    /// that unloads the code the handler is still executing.
    pub fn dispatch(&self, event: EventRef<'_>) -> usize {
        let type_id = event.type_id();
        let snapshot: Vec<ListenerId> = match self.categories.borrow().get(&type_id) {
            Some(category) => category.keys().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for id in snapshot {
            let target = self
                .categories
                .borrow()
                .get(&type_id)
                .and_then(|category| category.get(&id))
                .map(Weak::upgrade);

            let listener = match target {
                Some(Some(listener)) => listener,
                Some(None) => {
                    // The owner dropped it without going through `Listener`.
                    warn!(listener = ?id, event = event.name(), "Dropping dead listener");
                    self.unsubscribe_all(id);
                    continue;
                }
                None => continue,
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            match outcome {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        listener = ?id,
                        event = event.name(),
                        panic = panic_message(payload.as_ref()),
                        "Event handler panicked, unsubscribing listener from every category"
                    );
                    self.unsubscribe_all(id);
                }
            }
        }
        delivered
    }

    fn register_name(&self, type_id: EventTypeId, name: &'static str) -> bool {
        match self.names.borrow_mut().entry(type_id) {
            Entry::Vacant(slot) => {
                slot.insert(name);
                true
            }
            Entry::Occupied(existing) if *existing.get() == name => true,
            Entry::Occupied(existing) => {
                error!(
                    id = %type_id,
                    registered = *existing.get(),
                    rejected = name,
                    "Event type id collision"
                );
                false
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let categories = self.categories.borrow();
        f.debug_struct("EventBus")
            .field("categories", &categories.len())
            .field(
                "subscriptions",
                &categories.values().map(|c| c.len()).sum::<usize>(),
            )
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Owning wrapper that ties a listener's bus registration to its lifetime.
///
/// Dropping a `Listener` removes it from every category before the inner
/// value is released, so it cannot be dispatched to once teardown begins.
pub struct Listener<L: EventListener + 'static> {
    // Declared first: dropped (and unsubscribed) before `inner`.
    registration: Registration,
    inner: Rc<L>,
}

struct Registration {
    bus: Weak<EventBus>,
    id: ListenerId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe_all(self.id);
        }
    }
}

impl<L: EventListener + 'static> Listener<L> {
    pub fn new(bus: &Rc<EventBus>, inner: L) -> Self {
        let inner = Rc::new(inner);
        Self {
            registration: Registration {
                bus: Rc::downgrade(bus),
                id: ListenerId::of(&inner),
            },
            inner,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.registration.id
    }

    pub fn subscribe<E: Event>(&self) -> bool {
        match self.registration.bus.upgrade() {
            Some(bus) => bus.subscribe_to::<E>(&self.as_weak()),
            None => false,
        }
    }

    pub fn subscribe_id(&self, type_id: EventTypeId) -> bool {
        match self.registration.bus.upgrade() {
            Some(bus) => bus.subscribe(&self.as_weak(), type_id),
            None => false,
        }
    }

    pub fn unsubscribe<E: Event>(&self) -> bool {
        self.unsubscribe_id(E::ID)
    }

    pub fn unsubscribe_id(&self, type_id: EventTypeId) -> bool {
        match self.registration.bus.upgrade() {
            Some(bus) => bus.unsubscribe(self.id(), type_id),
            None => false,
        }
    }

    fn as_weak(&self) -> Weak<dyn EventListener> {
        let weak: Weak<L> = Rc::downgrade(&self.inner);
        weak
    }
}

impl<L: EventListener + 'static> Deref for Listener<L> {
    type Target = L;

    fn deref(&self) -> &L {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    struct Tick(u32);
    impl Event for Tick {
        const NAME: &'static str = "test.tick";
    }

    struct Tock;
    impl Event for Tock {
        const NAME: &'static str = "test.tock";
    }

    #[derive(Default)]
    struct Counter {
        ticks: Cell<u32>,
        last: Cell<u32>,
    }

    impl EventListener for Counter {
        fn on_event(&self, event: &EventRef<'_>) {
            if let Some(tick) = event.get::<Tick>() {
                self.ticks.set(self.ticks.get() + 1);
                self.last.set(tick.0);
            }
        }
    }

    fn weak_of<L: EventListener + 'static>(rc: &Rc<L>) -> Weak<dyn EventListener> {
        let weak: Weak<L> = Rc::downgrade(rc);
        weak
    }

    #[test]
    fn subscribe_then_publish_delivers_once() {
        let bus = EventBus::new();
        let counter = Rc::new(Counter::default());

        assert!(bus.subscribe_to::<Tick>(&weak_of(&counter)));
        assert_eq!(bus.publish(&Tick(3)), 1);
        assert_eq!(counter.ticks.get(), 1);
        assert_eq!(counter.last.get(), 3);
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = EventBus::new();
        let counter = Rc::new(Counter::default());
        let weak = weak_of(&counter);

        assert!(bus.subscribe(&weak, Tick::ID));
        assert!(!bus.subscribe(&weak, Tick::ID));
        assert_eq!(bus.listener_count(Tick::ID), 1);

        bus.publish(&Tick(1));
        assert_eq!(counter.ticks.get(), 1);
    }

    #[test]
    fn dead_listener_cannot_subscribe() {
        let bus = EventBus::new();
        let never: Weak<dyn EventListener> = Weak::<Counter>::new();
        assert!(!bus.subscribe(&never, Tick::ID));

        let counter = Rc::new(Counter::default());
        let weak = weak_of(&counter);
        drop(counter);
        assert!(!bus.subscribe(&weak, Tick::ID));
        assert_eq!(bus.listener_count(Tick::ID), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let counter = Rc::new(Counter::default());
        bus.subscribe_to::<Tick>(&weak_of(&counter));

        assert!(bus.unsubscribe(ListenerId::of(&counter), Tick::ID));
        assert!(!bus.unsubscribe(ListenerId::of(&counter), Tick::ID));
        assert_eq!(bus.publish(&Tick(1)), 0);
        assert_eq!(counter.ticks.get(), 0);
    }

    #[test]
    fn publish_without_listeners_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&Tock), 0);
    }

    #[test]
    fn unsubscribe_all_clears_every_category() {
        let bus = EventBus::new();
        let counter = Rc::new(Counter::default());
        let weak = weak_of(&counter);
        bus.subscribe_to::<Tick>(&weak);
        bus.subscribe_to::<Tock>(&weak);

        assert_eq!(bus.unsubscribe_all(ListenerId::of(&counter)), 2);
        assert_eq!(bus.listener_count(Tick::ID), 0);
        assert_eq!(bus.listener_count(Tock::ID), 0);
    }

    #[test]
    fn dropped_listener_is_never_dispatched_to() {
        let bus = Rc::new(EventBus::new());
        let seen = Rc::new(Cell::new(0));

        struct Shared(Rc<Cell<u32>>);
        impl EventListener for Shared {
            fn on_event(&self, _event: &EventRef<'_>) {
                self.0.set(self.0.get() + 1);
            }
        }

        let listener = Listener::new(&bus, Shared(seen.clone()));
        assert!(listener.subscribe::<Tick>());
        assert!(listener.subscribe::<Tock>());
        bus.publish(&Tick(0));
        assert_eq!(seen.get(), 1);

        drop(listener);
        assert_eq!(bus.listener_count(Tick::ID), 0);
        assert_eq!(bus.listener_count(Tock::ID), 0);
        assert_eq!(bus.publish(&Tick(0)), 0);
        assert_eq!(bus.publish(&Tock), 0);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn listener_outliving_the_bus_drops_cleanly() {
        let bus = Rc::new(EventBus::new());
        let listener = Listener::new(&bus, Counter::default());
        listener.subscribe::<Tick>();
        drop(bus);

        assert!(!listener.subscribe::<Tock>());
        drop(listener);
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let bus = Rc::new(EventBus::new());
        let victim: Rc<RefCell<Option<Listener<Counter>>>> = Rc::new(RefCell::new(None));

        struct Remover {
            victim: Rc<RefCell<Option<Listener<Counter>>>>,
        }
        impl EventListener for Remover {
            fn on_event(&self, _event: &EventRef<'_>) {
                self.victim.borrow_mut().take();
            }
        }

        let counter = Listener::new(&bus, Counter::default());
        counter.subscribe::<Tick>();
        let counter_rc = counter.inner.clone();
        *victim.borrow_mut() = Some(counter);

        let remover = Listener::new(&bus, Remover { victim: victim.clone() });
        remover.subscribe::<Tick>();

        // Whichever runs first, the counter hears at most this one event,
        // and never anything after the remover has run.
        bus.publish(&Tick(1));
        let after_first = counter_rc.ticks.get();
        assert!(after_first <= 1);

        bus.publish(&Tick(2));
        assert_eq!(counter_rc.ticks.get(), after_first);
        assert_eq!(bus.listener_count(Tick::ID), 1);
    }

    #[test]
    fn listener_added_mid_dispatch_waits_for_next_publish() {
        let bus = Rc::new(EventBus::new());
        let late: Rc<RefCell<Option<Listener<Counter>>>> = Rc::new(RefCell::new(None));

        struct Adder {
            bus: Weak<EventBus>,
            late: Rc<RefCell<Option<Listener<Counter>>>>,
        }
        impl EventListener for Adder {
            fn on_event(&self, _event: &EventRef<'_>) {
                let Some(bus) = self.bus.upgrade() else { return };
                let mut slot = self.late.borrow_mut();
                if slot.is_none() {
                    let listener = Listener::new(&bus, Counter::default());
                    listener.subscribe::<Tick>();
                    *slot = Some(listener);
                }
            }
        }

        let adder = Listener::new(
            &bus,
            Adder {
                bus: Rc::downgrade(&bus),
                late: late.clone(),
            },
        );
        adder.subscribe::<Tick>();

        assert_eq!(bus.publish(&Tick(1)), 1);
        let ticks = |late: &Rc<RefCell<Option<Listener<Counter>>>>| {
            late.borrow().as_ref().map(|l| l.ticks.get())
        };
        assert_eq!(ticks(&late), Some(0));

        assert_eq!(bus.publish(&Tick(2)), 2);
        assert_eq!(ticks(&late), Some(1));
    }

    #[test]
    fn panicking_handler_is_quarantined() {
        let bus = Rc::new(EventBus::new());

        struct Faulty;
        impl EventListener for Faulty {
            fn on_event(&self, _event: &EventRef<'_>) {
                panic!("handler bug");
            }
        }

        let faulty = Listener::new(&bus, Faulty);
        faulty.subscribe::<Tick>();
        faulty.subscribe::<Tock>();
        let healthy = Listener::new(&bus, Counter::default());
        healthy.subscribe::<Tick>();

        let delivered = bus.publish(&Tick(9));
        assert_eq!(delivered, 1);
        assert_eq!(healthy.ticks.get(), 1);
        assert!(!bus.is_subscribed(faulty.id(), Tick::ID));
        assert!(!bus.is_subscribed(faulty.id(), Tock::ID));
    }

    #[test]
    fn colliding_name_is_refused() {
        struct Impostor;
        impl Event for Impostor {
            const NAME: &'static str = "test.impostor";
            const ID: EventTypeId = Tick::ID;
        }

        let bus = EventBus::new();
        let counter = Rc::new(Counter::default());
        let weak = weak_of(&counter);

        assert!(bus.subscribe_to::<Tick>(&weak));
        assert!(!bus.subscribe_to::<Impostor>(&weak));
        assert_eq!(bus.publish(&Impostor), 0);
        assert_eq!(bus.category_name(Tick::ID), Some("test.tick"));
        assert_eq!(counter.ticks.get(), 0);
    }
}
