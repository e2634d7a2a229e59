//! Bridge between the embedding page and the map.
//!
//! The page talks to the map through `CustomEvent`s on `window`:
//! `group-map:members` and `group-map:coordinates` carry group data,
//! `group-map:command` drives the view. The map answers with events on its
//! container element.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CustomEvent, CustomEventInit, EventTarget};

use crate::events::{GroupEvent, MapEventBus, MapNotification};
use crate::markers::MarkerHandle;
use crate::tiles::AssetLoader;
use crate::view::MapView;

pub const MEMBERS_EVENT: &str = "group-map:members";
pub const COORDINATES_EVENT: &str = "group-map:coordinates";
pub const COMMAND_EVENT: &str = "group-map:command";
pub const MARKER_ADDED_EVENT: &str = "group-map:marker-added";

/// A request from the page, as found in a `group-map:command` detail.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    FollowPlayer {
        name: String,
    },
    StopFollowingPlayer,
    AddInteractingMarker {
        x: f64,
        y: f64,
        label: String,
        #[serde(default, rename = "requestId")]
        request_id: Option<Value>,
    },
    RemoveInteractingMarker {
        handle: u64,
    },
    ShowPlane {
        plane: u8,
    },
}

impl HostCommand {
    pub fn parse(detail: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(detail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerAdded {
    pub handle: u64,
    pub request_id: Option<Value>,
}

/// Run `command` against the view. Adding a marker yields the reply the
/// page is waiting for.
pub fn apply_command<L: AssetLoader>(view: &mut MapView<L>, command: HostCommand) -> Option<MarkerAdded> {
    match command {
        HostCommand::FollowPlayer { name } => {
            view.follow_player(&name);
            None
        }
        HostCommand::StopFollowingPlayer => {
            view.stop_following_player();
            None
        }
        HostCommand::AddInteractingMarker {
            x,
            y,
            label,
            request_id,
        } => {
            let MarkerHandle(handle) = view.add_interacting_marker(x, y, &label);
            Some(MarkerAdded { handle, request_id })
        }
        HostCommand::RemoveInteractingMarker { handle } => {
            if !view.remove_interacting_marker(MarkerHandle(handle)) {
                tracing::debug!(handle, "no interacting marker to remove");
            }
            None
        }
        HostCommand::ShowPlane { plane } => {
            view.show_plane(plane);
            None
        }
    }
}

/// DOM event name and detail for a view notification.
pub fn notification_event(notification: &MapNotification) -> (&'static str, Value) {
    match *notification {
        MapNotification::PlaneChanged(plane) => ("plane-changed", json!({ "plane": plane })),
        MapNotification::TileClicked { x, y, plane } => {
            ("tile-clicked", json!({ "x": x, "y": y, "plane": plane }))
        }
        MapNotification::HoverChanged { x, y } => ("hover-changed", json!({ "x": x, "y": y })),
    }
}

/// Dispatch a notification on the map container. Must not be called while
/// the view is borrowed: page listeners may send commands synchronously.
pub fn dispatch_notification(target: &EventTarget, notification: &MapNotification) {
    let (name, detail) = notification_event(notification);
    dispatch(target, name, &detail);
}

fn dispatch(target: &EventTarget, name: &str, detail: &Value) {
    let detail = match detail.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
        Ok(detail) => detail,
        Err(err) => {
            tracing::warn!(event = name, %err, "could not convert event detail");
            return;
        }
    };
    let init = CustomEventInit::new();
    init.set_bubbles(true);
    init.set_detail(&detail);
    match CustomEvent::new_with_event_init_dict(name, &init) {
        Ok(event) => {
            let _ = target.dispatch_event(&event);
        }
        Err(err) => tracing::warn!(event = name, ?err, "could not create event"),
    }
}

fn event_detail(event: &web_sys::Event) -> Option<Value> {
    let event = event.dyn_ref::<CustomEvent>()?;
    match serde_wasm_bindgen::from_value::<Value>(event.detail()) {
        Ok(detail) => Some(detail),
        Err(err) => {
            tracing::warn!(event = %event.type_(), %err, "event detail is not JSON");
            None
        }
    }
}

pub(crate) struct EventBinding {
    target: EventTarget,
    name: &'static str,
    handler: Closure<dyn Fn(web_sys::Event)>,
}

impl EventBinding {
    pub(crate) fn listen(target: &EventTarget, name: &'static str, handler: impl Fn(web_sys::Event) + 'static) -> Option<Self> {
        let handler = Closure::<dyn Fn(web_sys::Event)>::new(handler);
        target
            .add_event_listener_with_callback(name, handler.as_ref().unchecked_ref())
            .ok()?;
        Some(Self {
            target: target.clone(),
            name,
            handler,
        })
    }
}

impl Drop for EventBinding {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.name, self.handler.as_ref().unchecked_ref());
    }
}

/// Window listeners for the page protocol. Removed when dropped.
pub struct HostBridge {
    _bindings: Vec<EventBinding>,
}

impl HostBridge {
    /// Group data goes onto `bus`; commands go straight to `view`.
    pub fn install<L: AssetLoader + 'static>(bus: MapEventBus, view: Rc<RefCell<MapView<L>>>) -> Self {
        let mut bindings = Vec::new();
        let Some(window) = web_sys::window() else {
            return Self { _bindings: bindings };
        };
        let window: EventTarget = window.into();

        let members_bus = bus.clone();
        bindings.extend(EventBinding::listen(&window, MEMBERS_EVENT, move |event| {
            if let Some(detail) = event_detail(&event) {
                members_bus.publish(&GroupEvent::MembersUpdated(detail));
            }
        }));

        bindings.extend(EventBinding::listen(&window, COORDINATES_EVENT, move |event| {
            if let Some(detail) = event_detail(&event) {
                bus.publish(&GroupEvent::CoordinatesUpdated(detail));
            }
        }));

        let reply_target = window.clone();
        bindings.extend(EventBinding::listen(&window, COMMAND_EVENT, move |event| {
            let Some(detail) = event_detail(&event) else {
                return;
            };
            let command = match HostCommand::parse(detail) {
                Ok(command) => command,
                Err(err) => {
                    tracing::warn!(%err, "ignoring map command");
                    return;
                }
            };
            let reply = match view.try_borrow_mut() {
                Ok(mut view) => apply_command(&mut view, command),
                Err(_) => {
                    tracing::warn!(?command, "map busy; dropping command");
                    return;
                }
            };
            if let Some(reply) = reply {
                match serde_json::to_value(&reply) {
                    Ok(detail) => dispatch(&reply_target, MARKER_ADDED_EVENT, &detail),
                    Err(err) => tracing::warn!(%err, "could not encode marker reply"),
                }
            }
        }));

        Self { _bindings: bindings }
    }
}
