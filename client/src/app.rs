use leptos::prelude::*;

use crate::canvas::MapCanvas;
use crate::events::MapEventBus;

/// Full-page map. The page feeds it group data through the
/// `group-map:*` window events.
#[component]
pub fn App() -> impl IntoView {
    let bus = MapEventBus::new();

    view! {
        <div style="width: 100%; height: 100%; position: relative; background: #000;">
            <MapCanvas bus=bus />
        </div>
    }
}
