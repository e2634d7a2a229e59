use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;

/// Group updates published by the host application. Payloads are raw JSON
/// and are validated by whoever consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    MembersUpdated(Value),
    CoordinatesUpdated(Value),
}

/// Things the map tells its host, drained after each frame or input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapNotification {
    PlaneChanged(u8),
    TileClicked { x: i32, y: i32, plane: u8 },
    HoverChanged { x: i32, y: i32 },
}

type Listener = Rc<dyn Fn(&GroupEvent)>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Single-threaded publish/subscribe channel owned by the host.
#[derive(Clone, Default)]
pub struct MapEventBus {
    listeners: Rc<RefCell<Listeners>>,
}

impl MapEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&GroupEvent) + 'static) -> Subscription {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Rc::new(listener)));
        Subscription {
            listeners: Rc::downgrade(&self.listeners),
            id,
        }
    }

    /// Deliver to every current listener. Listeners may subscribe or drop
    /// subscriptions while being called.
    pub fn publish(&self, event: &GroupEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

/// Unsubscribes when dropped.
pub struct Subscription {
    listeners: Weak<RefCell<Listeners>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .borrow_mut()
                .entries
                .retain(|(id, _)| *id != self.id);
        }
    }
}
