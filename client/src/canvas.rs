use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, EventTarget, HtmlCanvasElement, HtmlImageElement, PointerEvent,
    TouchEvent, WheelEvent,
};

use crate::assets::{ImageLoader, request_descriptor};
use crate::events::{MapEventBus, MapNotification, Subscription};
use crate::host::{self, EventBinding, HostBridge};
use crate::prefs::MapPrefs;
use crate::render_loop::{FrameClock, RenderScheduler};
use crate::surface::{DrawSurface, Rect, SurfaceError};
use crate::tiles::{AssetInbox, AssetLoader};
use crate::view::MapView;

type SharedView = Rc<RefCell<MapView<ImageLoader>>>;

/// [`DrawSurface`] over a `<canvas>` 2D context.
#[derive(Clone)]
pub struct Canvas2dSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

impl Canvas2dSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, SurfaceError> {
        let ctx = canvas
            .get_context("2d")
            .map_err(js_error)?
            .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
            .ok_or_else(|| SurfaceError("canvas has no 2d context".into()))?;
        ctx.set_image_smoothing_enabled(false);
        Ok(Self { canvas, ctx })
    }

    /// Match the backing store to the parent's size. Returns the new size
    /// when it changed.
    pub fn fit_to_parent(&self) -> Option<(f64, f64)> {
        let parent = self.canvas.parent_element()?;
        let w = parent.client_width().max(0) as u32;
        let h = parent.client_height().max(0) as u32;
        if w == 0 || h == 0 || (w == self.canvas.width() && h == self.canvas.height()) {
            return None;
        }
        self.canvas.set_width(w);
        self.canvas.set_height(h);
        // Resizing resets context state.
        self.ctx.set_image_smoothing_enabled(false);
        Some((w as f64, h as f64))
    }
}

fn js_error(err: wasm_bindgen::JsValue) -> SurfaceError {
    SurfaceError(format!("{err:?}"))
}

impl DrawSurface for Canvas2dSurface {
    type Image = HtmlImageElement;

    fn set_transform(&mut self, m: [f64; 6]) -> Result<(), SurfaceError> {
        self.ctx
            .set_transform(m[0], m[1], m[2], m[3], m[4], m[5])
            .map_err(js_error)
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.ctx.set_global_alpha(alpha);
    }

    fn clear_rect(&mut self, rect: Rect) {
        self.ctx.clear_rect(rect.x, rect.y, rect.w, rect.h);
    }

    fn draw_image(&mut self, image: &HtmlImageElement, dst: Rect) -> Result<(), SurfaceError> {
        self.ctx
            .draw_image_with_html_image_element_and_dw_and_dh(image, dst.x, dst.y, dst.w, dst.h)
            .map_err(js_error)
    }

    fn draw_sprite(&mut self, image: &HtmlImageElement, src: Rect, dst: Rect) -> Result<(), SurfaceError> {
        self.ctx
            .draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                image, src.x, src.y, src.w, src.h, dst.x, dst.y, dst.w, dst.h,
            )
            .map_err(js_error)
    }

    fn stroke_fill_squares(&mut self, origins: &[(f64, f64)], size: f64, fill: &str, stroke: &str) {
        self.ctx.begin_path();
        for &(x, y) in origins {
            self.ctx.rect(x, y, size, size);
        }
        self.ctx.set_stroke_style_str(stroke);
        self.ctx.stroke();
        self.ctx.set_fill_style_str(fill);
        self.ctx.fill();
    }

    fn set_text_style(&mut self, font: &str, line_width: f64) {
        self.ctx.set_font(font);
        self.ctx.set_text_align("center");
        self.ctx.set_line_width(line_width);
    }

    fn stroke_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), SurfaceError> {
        self.ctx.set_stroke_style_str(color);
        self.ctx.stroke_text(text, x, y).map_err(js_error)
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), SurfaceError> {
        self.ctx.set_fill_style_str(color);
        self.ctx.fill_text(text, x, y).map_err(js_error)
    }
}

/// Everything that keeps a mounted map alive. Dropping it stops the frame
/// loop, removes the page listeners and unsubscribes from the bus.
struct MapSession {
    _scheduler: RenderScheduler,
    _bridge: HostBridge,
    _subscription: Subscription,
    _resize: Option<EventBinding>,
}

thread_local! {
    static MAP_SESSION: RefCell<Option<MapSession>> = const { RefCell::new(None) };
}

/// Run an input handler against the view unless it is already borrowed.
/// Returns whether the handler ran.
fn with_view<L: AssetLoader>(view: &RefCell<MapView<L>>, f: impl FnOnce(&mut MapView<L>)) -> bool {
    match view.try_borrow_mut() {
        Ok(mut view) => {
            f(&mut view);
            true
        }
        Err(_) => {
            tracing::warn!("map busy; dropping input event");
            false
        }
    }
}

fn save_prefs(view: &SharedView) {
    if let Ok(view) = view.try_borrow() {
        view.prefs().save();
    }
}

fn local_point(canvas_ref: NodeRef<leptos::html::Canvas>, client_x: f64, client_y: f64) -> (f64, f64) {
    match canvas_ref.get_untracked() {
        Some(el) => {
            let rect = el.get_bounding_client_rect();
            (client_x - rect.left(), client_y - rect.top())
        }
        None => (client_x, client_y),
    }
}

fn touch_points(canvas_ref: NodeRef<leptos::html::Canvas>, touches: &web_sys::TouchList) -> Vec<(f64, f64)> {
    (0..touches.length())
        .filter_map(|i| touches.get(i))
        .map(|t| local_point(canvas_ref, t.client_x() as f64, t.client_y() as f64))
        .collect()
}

/// The interactive map. Group data arrives through `bus`.
#[component]
pub fn MapCanvas(bus: MapEventBus) -> impl IntoView {
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let container_ref = NodeRef::<leptos::html::Div>::new();
    let hover = RwSignal::new(None::<(i32, i32)>);
    let plane = RwSignal::new(0u8);

    let clock = FrameClock::new();
    let inbox = AssetInbox::new(clock.clone());
    let (width, height) = web_sys::window()
        .map(|w| {
            let w_px = w.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
            let h_px = w.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
            (w_px, h_px)
        })
        .unwrap_or((0.0, 0.0));
    let view: SharedView = Rc::new(RefCell::new(MapView::new(
        ImageLoader::new(inbox.clone()),
        inbox.clone(),
        clock.clone(),
        width,
        height,
    )));
    request_descriptor(inbox);

    Effect::new({
        let view = view.clone();
        move || {
            let (Some(canvas), Some(container)) = (canvas_ref.get(), container_ref.get()) else {
                return;
            };
            let canvas: &HtmlCanvasElement = &canvas;
            let surface = match Canvas2dSurface::new(canvas.clone()) {
                Ok(surface) => surface,
                Err(err) => {
                    tracing::error!(%err, "map canvas unavailable");
                    return;
                }
            };
            with_view(&view, |view| {
                if let Some((w, h)) = surface.fit_to_parent() {
                    view.resize(w, h);
                }
                view.restore(MapPrefs::load());
                plane.set(view.plane());
            });

            let resize = web_sys::window().and_then(|window| {
                let resize_view = view.clone();
                let resize_surface = surface.clone();
                EventBinding::listen(&window.into(), "resize", move |_| {
                    if let Some((w, h)) = resize_surface.fit_to_parent() {
                        with_view(&resize_view, |view| view.resize(w, h));
                    }
                })
            });

            let container: EventTarget = container.clone().into();
            let frame_view = view.clone();
            let frame_clock = clock.clone();
            let mut surface = surface;
            let scheduler = RenderScheduler::start(move |timestamp| {
                let Some(elapsed) = frame_clock.begin_frame(timestamp) else {
                    return;
                };
                let (needs_more, notifications) = match frame_view.try_borrow_mut() {
                    Ok(mut view) => {
                        let needs_more = view.step(elapsed, &mut surface);
                        (needs_more, view.take_notifications())
                    }
                    Err(_) => (true, Vec::new()),
                };
                frame_clock.end_frame(needs_more);

                for notification in &notifications {
                    host::dispatch_notification(&container, notification);
                    match *notification {
                        MapNotification::PlaneChanged(p) => {
                            plane.set(p);
                            save_prefs(&frame_view);
                        }
                        MapNotification::HoverChanged { x, y } => hover.set(Some((x, y))),
                        MapNotification::TileClicked { .. } => {}
                    }
                }
            });

            let bus_view = view.clone();
            let subscription = bus.subscribe(move |event| match bus_view.try_borrow_mut() {
                Ok(mut view) => view.handle_group_event(event),
                Err(_) => tracing::warn!(?event, "map busy; dropping group event"),
            });
            tracing::debug!(listeners = bus.listener_count(), "map subscribed to group events");
            let bridge = HostBridge::install(bus.clone(), view.clone());

            MAP_SESSION.with(|slot| {
                *slot.borrow_mut() = Some(MapSession {
                    _scheduler: scheduler,
                    _bridge: bridge,
                    _subscription: subscription,
                    _resize: resize,
                });
            });
        }
    });

    on_cleanup(|| {
        MAP_SESSION.with(|slot| slot.borrow_mut().take());
    });

    // --- Input handlers ---

    let on_wheel = {
        let view = view.clone();
        move |e: WheelEvent| {
            e.prevent_default();
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            with_view(&view, |view| view.wheel(e.delta_y(), x, y));
            save_prefs(&view);
        }
    };

    let on_pointer_down = {
        let view = view.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            with_view(&view, |view| view.pointer_down(x, y, js_sys::Date::now()));
            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
                el.style().set_property("cursor", "grabbing").ok();
            }
        }
    };

    let on_pointer_move = {
        let view = view.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            with_view(&view, |view| view.pointer_move(x, y, js_sys::Date::now()));
        }
    };

    let on_pointer_up = {
        let view = view.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            with_view(&view, |view| view.pointer_up(js_sys::Date::now()));
            save_prefs(&view);
            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.style().set_property("cursor", "grab").ok();
            }
        }
    };

    // Leaving, re-entering or a cancelled pointer ends a drag without a click
    // or a fling.
    let on_pointer_cancel = {
        let view = view.clone();
        move |_: PointerEvent| {
            with_view(&view, |view| view.cancel_drag());
        }
    };

    let on_touch_start = {
        let view = view.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let touches = touch_points(canvas_ref, &e.touches());
            with_view(&view, |view| view.touch_start(&touches, js_sys::Date::now()));
        }
    };

    let on_touch_move = {
        let view = view.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let touches = touch_points(canvas_ref, &e.touches());
            with_view(&view, |view| view.touch_move(&touches, js_sys::Date::now()));
        }
    };

    let on_touch_end = {
        let view = view.clone();
        move |e: TouchEvent| {
            let remaining = touch_points(canvas_ref, &e.touches());
            with_view(&view, |view| view.touch_end(&remaining, js_sys::Date::now()));
            if remaining.is_empty() {
                save_prefs(&view);
            }
        }
    };

    let on_touch_cancel = {
        let view = view.clone();
        move |_: TouchEvent| {
            with_view(&view, |view| view.touch_cancel());
        }
    };

    let plane_buttons = (0u8..4)
        .map(|p| {
            let view = view.clone();
            view! {
                <button
                    style:font-weight=move || if plane.get() == p { "bold" } else { "normal" }
                    on:click=move |_| {
                        with_view(&view, |view| {
                            view.show_plane(p);
                        });
                    }
                >
                    {p}
                </button>
            }
        })
        .collect_view();

    let readout = move || match hover.get() {
        Some((x, y)) => format!("{x}, {y}, {}", plane.get()),
        None => String::new(),
    };

    view! {
        <div
            node_ref=container_ref
            style="position: relative; width: 100%; height: 100%; overflow: hidden;"
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:pointercancel=on_pointer_cancel.clone()
            on:pointerleave=on_pointer_cancel.clone()
            on:pointerenter=on_pointer_cancel
            on:touchstart=on_touch_start
            on:touchmove=on_touch_move
            on:touchend=on_touch_end
            on:touchcancel=on_touch_cancel
        >
            <canvas
                node_ref=canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; image-rendering: pixelated; cursor: grab;"
            />
            <div
                style="position: absolute; top: 8px; right: 8px; display: flex; gap: 4px;"
                on:pointerdown=|e: PointerEvent| e.stop_propagation()
                on:wheel=|e: WheelEvent| e.stop_propagation()
            >
                {plane_buttons}
            </div>
            <div style="position: absolute; bottom: 8px; left: 8px; font-family: rssmall, monospace; color: #ffff00; text-shadow: 1px 1px #000; pointer-events: none;">
                {readout}
            </div>
        </div>
    }
}
