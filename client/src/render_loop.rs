use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::config::MAX_PENDING_FRAMES;

/// Counts frames owed to the map.
///
/// `request_update()` banks a frame (saturating at [`MAX_PENDING_FRAMES`]);
/// each frame that does work consumes one, and a frame whose animations
/// are still running keeps at least one banked. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    pending: Rc<Cell<u32>>,
    previous: Rc<Cell<Option<f64>>>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_update(&self) {
        self.pending
            .set((self.pending.get() + 1).min(MAX_PENDING_FRAMES));
    }

    pub fn pending(&self) -> u32 {
        self.pending.get()
    }

    /// Called on every browser frame. Returns the elapsed milliseconds when
    /// this frame should do work.
    pub fn begin_frame(&self, timestamp: f64) -> Option<f64> {
        let previous = self.previous.replace(Some(timestamp));
        let elapsed = timestamp - previous?;
        if elapsed <= 0.0 || self.pending.get() == 0 {
            return None;
        }
        self.pending.set(self.pending.get() - 1);
        Some(elapsed)
    }

    pub fn end_frame(&self, needs_more: bool) {
        if needs_more {
            self.pending.set(self.pending.get().max(1));
        }
    }
}

/// Re-arms `requestAnimationFrame` every frame until dropped.
///
/// The next frame is requested before `frame` runs, so a frame that fails
/// partway still leaves the loop alive.
pub struct RenderScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    window: Option<web_sys::Window>,
    raf_id: Cell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut(f64)>>>,
}

impl Inner {
    fn request_frame(&self) {
        let cb_ref = self.callback.borrow();
        let (Some(cb), Some(window)) = (cb_ref.as_ref(), self.window.as_ref()) else {
            self.raf_id.set(None);
            return;
        };
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => self.raf_id.set(None),
        }
    }
}

impl RenderScheduler {
    /// Start the loop. `frame` receives the rAF timestamp in milliseconds.
    pub fn start(mut frame: impl FnMut(f64) + 'static) -> Self {
        let inner = Rc::new(Inner {
            window: web_sys::window(),
            raf_id: Cell::new(None),
            callback: RefCell::new(None),
        });

        let inner_cb = inner.clone();
        let cb = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
            inner_cb.request_frame();
            frame(timestamp);
        });
        *inner.callback.borrow_mut() = Some(cb);
        inner.request_frame();

        Self { inner }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        if let Some(raf_id) = self.inner.raf_id.replace(None)
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        // Break the callback->inner reference cycle on teardown.
        self.inner.callback.borrow_mut().take();
    }
}
