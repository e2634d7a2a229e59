//! The interactive map: camera, caches, markers and input, advanced one
//! frame at a time by [`MapView::step`].

use groupiron_shared::{Coordinates, MapDescriptor, PLANE_COUNT, RegionCoord};

use crate::camera::Camera;
use crate::config::{
    FOLLOW_RETARGET_MS, ICON_MAX_SCALE, ICON_SPRITE_PX, INITIAL_CENTER, INITIAL_ZOOM,
    LABEL_MAX_SCALE, MAX_ZOOM, MIN_ZOOM, WHEEL_ZOOM_MS,
};
use crate::events::{GroupEvent, MapNotification};
use crate::gesture::{GestureState, Pinch, pinch_center, pinch_distance, wheel_zoom_target};
use crate::markers::{
    CoordinateOutcome, INTERACTING_STYLE, MarkerGlyph, MarkerHandle, MarkerLayer, PLAYER_STYLE,
    draw_markers, square_origin,
};
use crate::prefs::MapPrefs;
use crate::render_loop::FrameClock;
use crate::surface::{DrawSurface, Rect, SurfaceError};
use crate::tiles::{
    AssetEvent, AssetInbox, AssetKey, AssetLoader, AssetState, LabelImageCache, TileCache,
    TileDraw,
};
use crate::transform::{MapMetrics, ViewRect, canvas_transform};

pub struct MapView<L: AssetLoader> {
    metrics: MapMetrics,
    camera: Camera,
    gestures: GestureState,
    markers: MarkerLayer,
    tiles: TileCache<L::Image>,
    labels: LabelImageCache<L::Image>,
    icon_atlas: Option<AssetState<L::Image>>,
    descriptor: Option<MapDescriptor>,
    loader: L,
    inbox: AssetInbox<L::Image>,
    clock: FrameClock,
    plane: u8,
    width: f64,
    height: f64,
    hover_tile: Option<(i32, i32)>,
    notifications: Vec<MapNotification>,
}

impl<L: AssetLoader> MapView<L> {
    /// A view of `width x height` client pixels centred on the default
    /// location. `loader` must report into `inbox`.
    pub fn new(loader: L, inbox: AssetInbox<L::Image>, clock: FrameClock, width: f64, height: f64) -> Self {
        let mut view = Self {
            metrics: MapMetrics::default(),
            camera: Camera::new(0.0, 0.0, INITIAL_ZOOM, MIN_ZOOM, MAX_ZOOM),
            gestures: GestureState::default(),
            markers: MarkerLayer::new(),
            tiles: TileCache::new(),
            labels: LabelImageCache::new(),
            icon_atlas: None,
            descriptor: None,
            loader,
            inbox,
            clock,
            plane: 0,
            width,
            height,
            hover_tile: None,
            notifications: Vec::new(),
        };
        view.center_on(INITIAL_CENTER.0, INITIAL_CENTER.1, 0.0);
        view.clock.request_update();
        view
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn plane(&self) -> u8 {
        self.plane
    }

    pub fn hover_tile(&self) -> Option<(i32, i32)> {
        self.hover_tile
    }

    pub fn descriptor(&self) -> Option<&MapDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn request_update(&self) {
        self.clock.request_update();
    }

    pub fn take_notifications(&mut self) -> Vec<MapNotification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.request_update();
    }

    /// Animate so the middle of world tile `(x, y)` is centred.
    pub fn center_on(&mut self, x: f64, y: f64, duration: f64) {
        let metrics = self.metrics;
        self.camera
            .center_on(&metrics, x, y, self.width, self.height, duration);
        self.request_update();
    }

    /// Jump to a saved position without animating.
    pub fn restore(&mut self, prefs: MapPrefs) {
        let prefs = prefs.sanitized();
        self.camera.cancel_animation();
        let zoom = self.camera.clamp_zoom(prefs.zoom);
        self.camera.zoom.go_to(zoom, 0.0);
        self.center_on(prefs.center_x, prefs.center_y, 0.0);
        self.show_plane(prefs.plane);
    }

    /// Where the camera is heading, in the form [`MapView::restore`] takes.
    pub fn prefs(&self) -> MapPrefs {
        let cam = self.camera.target_state(self.width, self.height);
        let (x, y) = self
            .metrics
            .client_to_world(self.width / 2.0, self.height / 2.0, &cam);
        MapPrefs {
            plane: self.plane,
            center_x: x - 0.5,
            center_y: y - 0.5,
            zoom: cam.zoom,
        }
    }

    pub fn handle_group_event(&mut self, event: &GroupEvent) {
        match event {
            GroupEvent::MembersUpdated(payload) => match self.markers.apply_members(payload) {
                Ok(count) => tracing::debug!(count, "group roster updated"),
                Err(rejection) => tracing::warn!(%rejection, "ignoring member list"),
            },
            GroupEvent::CoordinatesUpdated(payload) => match self.markers.apply_coordinates(payload) {
                Ok(CoordinateOutcome::Applied) => {}
                Ok(CoordinateOutcome::NotInRoster) => {
                    tracing::debug!("coordinates for a player outside the roster");
                    return;
                }
                Err(rejection) => {
                    tracing::warn!(%rejection, "ignoring coordinate update");
                    return;
                }
            },
        }
        self.request_update();
    }

    pub fn follow_player(&mut self, name: &str) -> bool {
        let following = self.markers.follow(name);
        if following {
            self.request_update();
        } else {
            tracing::debug!(name, "no valid position to follow");
        }
        following
    }

    pub fn stop_following_player(&mut self) {
        self.markers.stop_following();
    }

    pub fn add_interacting_marker(&mut self, x: f64, y: f64, label: &str) -> MarkerHandle {
        let handle = self.markers.add_interacting(x, y, label);
        self.request_update();
        handle
    }

    pub fn remove_interacting_marker(&mut self, handle: MarkerHandle) -> bool {
        let removed = self.markers.remove_interacting(handle);
        self.request_update();
        removed
    }

    /// Switch the rendered floor. Returns whether it changed.
    pub fn show_plane(&mut self, plane: u8) -> bool {
        if plane as usize >= PLANE_COUNT || plane == self.plane {
            return false;
        }
        self.plane = plane;
        self.notifications.push(MapNotification::PlaneChanged(plane));
        self.request_update();
        true
    }

    pub fn tile_at_client(&self, sx: f64, sy: f64) -> (i32, i32) {
        let cam = self.camera.state(self.width, self.height);
        let (px, py) = self.metrics.client_to_canvas(sx, sy, &cam);
        self.metrics.world_tile_at_canvas(px, py)
    }

    pub fn pointer_down(&mut self, x: f64, y: f64, now: f64) {
        self.camera.is_dragging = true;
        self.camera.cancel_animation();
        self.gestures.begin_drag(x, y, now);
        self.markers.stop_following();
        self.request_update();
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, now: f64) {
        let (dx, dy) = self.gestures.track_move(x, y, now);
        if self.camera.is_dragging {
            self.camera.drag_by(dx, dy);
            self.gestures.refresh_momentum();
        }
        self.update_hover(x, y);
        self.request_update();
    }

    /// End a drag. A press that barely moved reports the clicked tile.
    pub fn pointer_up(&mut self, now: f64) {
        if !self.camera.is_dragging {
            return;
        }
        self.camera.is_dragging = false;
        if let Some((x, y)) = self.gestures.end_drag(now) {
            let (tx, ty) = self.tile_at_client(x, y);
            self.notifications.push(MapNotification::TileClicked {
                x: tx,
                y: ty,
                plane: self.plane,
            });
        }
        self.request_update();
    }

    /// End a drag without treating it as a click (pointer left, touch
    /// cancelled, second finger landed).
    pub fn cancel_drag(&mut self) {
        if !self.camera.is_dragging {
            return;
        }
        self.camera.is_dragging = false;
        self.gestures.cancel();
        self.request_update();
    }

    pub fn wheel(&mut self, delta_y: f64, x: f64, y: f64) {
        if self.camera.is_dragging {
            return;
        }
        let tile_size = self.metrics.tile_size;
        if let Some(zoom) = wheel_zoom_target(self.camera.zoom.target, delta_y, tile_size) {
            self.zoom_onto(x, y, zoom, WHEEL_ZOOM_MS);
        }
    }

    pub fn touch_start(&mut self, touches: &[(f64, f64)], now: f64) {
        match touches {
            [(x, y)] => self.pointer_down(*x, *y, now),
            [a, b, ..] => {
                self.cancel_drag();
                self.gestures.pinch = Some(Pinch {
                    start_distance: pinch_distance(*a, *b),
                    start_zoom: self.camera.zoom.current,
                });
            }
            [] => {}
        }
    }

    pub fn touch_move(&mut self, touches: &[(f64, f64)], now: f64) {
        match touches {
            [(x, y)] => {
                if !self.camera.is_dragging {
                    self.pointer_down(*x, *y, now);
                }
                self.pointer_move(*x, *y, now);
            }
            [a, b, ..] => {
                self.cancel_drag();
                let distance = pinch_distance(*a, *b);
                let pinch = *self.gestures.pinch.get_or_insert(Pinch {
                    start_distance: distance,
                    start_zoom: self.camera.zoom.current,
                });
                let (cx, cy) = pinch_center(*a, *b);
                self.zoom_onto(cx, cy, pinch.zoom_for(distance), 0.0);
            }
            [] => {}
        }
    }

    /// The browser took the touches away; nothing counts as a click.
    pub fn touch_cancel(&mut self) {
        self.gestures.pinch = None;
        self.cancel_drag();
    }

    /// `remaining` are the touches still down after the lift.
    pub fn touch_end(&mut self, remaining: &[(f64, f64)], now: f64) {
        if remaining.len() < 2 {
            self.gestures.pinch = None;
        }
        if remaining.is_empty() {
            self.pointer_up(now);
        }
    }

    /// Zoom anchored at client `(x, y)`, or at the followed player when
    /// following. Ignored mid-drag.
    fn zoom_onto(&mut self, x: f64, y: f64, zoom: f64, duration: f64) -> bool {
        if self.camera.is_dragging {
            return false;
        }
        self.gestures.momentum.stop();
        let (ax, ay) = match self.markers.follow_target() {
            Some(target) => {
                let cam = self.camera.state(self.width, self.height);
                self.metrics.world_to_client(target.x + 0.5, target.y + 0.5, &cam)
            }
            None => (x, y),
        };
        let changed = self.camera.zoom_onto_point(ax, ay, zoom, duration);
        if changed {
            self.request_update();
        }
        changed
    }

    fn update_hover(&mut self, x: f64, y: f64) {
        let tile = self.tile_at_client(x, y);
        if self.hover_tile != Some(tile) {
            self.hover_tile = Some(tile);
            self.notifications.push(MapNotification::HoverChanged {
                x: tile.0,
                y: tile.1,
            });
        }
    }

    fn drain_inbox(&mut self) {
        for event in self.inbox.drain() {
            match event {
                AssetEvent::Loaded(AssetKey::Tile(region), image) => self.tiles.complete(region, image),
                AssetEvent::Loaded(AssetKey::Label(id), image) => self.labels.complete(id, image),
                AssetEvent::Loaded(AssetKey::IconAtlas, image) => {
                    self.icon_atlas = Some(AssetState::Loaded(image));
                }
                AssetEvent::Failed(key, reason) => {
                    tracing::warn!(url = %key.url(), %reason, "map asset failed to load");
                    match key {
                        AssetKey::Tile(region) => self.tiles.fail(region),
                        AssetKey::Label(id) => self.labels.fail(id),
                        AssetKey::IconAtlas => self.icon_atlas = Some(AssetState::Failed),
                    }
                }
                AssetEvent::Descriptor(descriptor) => {
                    tracing::info!(tiles = descriptor.tile_count(), "map descriptor loaded");
                    self.tiles.set_valid_regions(descriptor.valid_regions());
                    self.descriptor = Some(*descriptor);
                    if self.icon_atlas.is_none() {
                        self.icon_atlas = Some(AssetState::Loading);
                        self.loader.load(AssetKey::IconAtlas);
                    }
                }
                AssetEvent::DescriptorFailed(reason) => {
                    tracing::warn!(%reason, "map descriptor unavailable; loading every visible region");
                }
            }
        }
    }

    /// Advance one frame of `elapsed` ms and draw it. Returns whether
    /// another frame is needed.
    pub fn step<S>(&mut self, elapsed: f64, surface: &mut S) -> bool
    where
        S: DrawSurface<Image = L::Image>,
    {
        let mut needs_more = false;
        self.drain_inbox();

        if !self.camera.is_dragging && self.gestures.momentum.is_moving() {
            let momentum = self.gestures.momentum;
            let x = self.camera.x.current + momentum.vx * elapsed;
            let y = self.camera.y.current + momentum.vy * elapsed;
            self.camera.x.go_to(x, 0.0);
            self.camera.y.go_to(y, 0.0);
            self.gestures.momentum.decay(elapsed);
            needs_more = true;
        }

        let zooming = self.camera.zoom.animate(elapsed);
        needs_more |= zooming;
        if !zooming && let Some(target) = self.markers.follow_target() {
            let metrics = self.metrics;
            self.camera.center_on(
                &metrics,
                target.x,
                target.y,
                self.width,
                self.height,
                FOLLOW_RETARGET_MS,
            );
            if let Some(plane) = target.plane_index() {
                self.show_plane(plane);
            }
        }
        needs_more |= self.camera.x.animate(elapsed);
        needs_more |= self.camera.y.animate(elapsed);
        needs_more |= self.tiles.animate_fades(elapsed);

        let cam = self.camera.state(self.width, self.height);
        log_layer("transform", surface.set_transform(canvas_transform(&cam)));
        let view = self.metrics.view_rect(&cam);
        let load_new = !self.camera.is_panning_big();

        log_layer("tiles", self.draw_tiles(surface, &view, load_new));
        log_layer("icons", self.draw_icons(surface, &view, cam.zoom));
        log_layer("labels", self.draw_labels(surface, &view, cam.zoom, load_new));
        let metrics = self.metrics;
        let players = self.markers.players().map(|marker| MarkerGlyph {
            label: &marker.name,
            coordinates: marker.coordinates.unwrap_or(UNKNOWN),
        });
        log_layer(
            "players",
            draw_markers(surface, &metrics, players, &PLAYER_STYLE, self.plane, cam.zoom),
        );
        let interacting = self.markers.interacting().map(|marker| MarkerGlyph {
            label: &marker.label,
            coordinates: marker.coordinates,
        });
        log_layer(
            "interacting",
            draw_markers(surface, &metrics, interacting, &INTERACTING_STYLE, self.plane, cam.zoom),
        );
        self.draw_cursor_tile(surface);

        needs_more
    }

    fn draw_tiles<S>(&mut self, surface: &mut S, view: &ViewRect, load_new: bool) -> Result<(), SurfaceError>
    where
        S: DrawSurface<Image = L::Image>,
    {
        let metrics = self.metrics;
        let size = metrics.tile_size;
        let mut first_error = None;
        for (rx, ry) in metrics.visible_regions(view, 0.0) {
            let (ox, oy) = metrics.region_origin(rx, ry);
            let dst = Rect::new(ox.round(), oy.round(), size, size);
            let region = RegionCoord::new(self.plane, rx, ry);
            match self.tiles.resolve(region, load_new, &self.loader) {
                TileDraw::Clear => surface.clear_rect(dst),
                TileDraw::Skip => {}
                TileDraw::Draw { image, alpha } => {
                    surface.set_alpha(alpha);
                    if alpha < 1.0 {
                        surface.clear_rect(dst);
                    }
                    if let Err(err) = surface.draw_image(&image.image, dst) {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        surface.set_alpha(1.0);
        first_error.map_or(Ok(()), Err)
    }

    fn draw_icons<S>(&self, surface: &mut S, view: &ViewRect, zoom: f64) -> Result<(), SurfaceError>
    where
        S: DrawSurface<Image = L::Image>,
    {
        let (Some(descriptor), Some(AssetState::Loaded(atlas))) = (&self.descriptor, &self.icon_atlas) else {
            return Ok(());
        };
        let metrics = &self.metrics;
        let scale = zoom.min(ICON_MAX_SCALE);
        let size = ICON_SPRITE_PX / scale;
        for (rx, ry) in metrics.visible_regions(view, metrics.region_tiles()) {
            for icon in descriptor.icons_in(self.plane, rx, ry) {
                let (x, y) = metrics.world_to_canvas(icon.x as f64 + 0.5, icon.y as f64 + 0.5);
                let src = Rect::new(ICON_SPRITE_PX * icon.sprite as f64, 0.0, ICON_SPRITE_PX, ICON_SPRITE_PX);
                let dst = Rect::new((x - size / 2.0).round(), (y - size / 2.0).round(), size, size);
                surface.draw_sprite(&atlas.image, src, dst)?;
            }
        }
        Ok(())
    }

    fn draw_labels<S>(&mut self, surface: &mut S, view: &ViewRect, zoom: f64, load_new: bool) -> Result<(), SurfaceError>
    where
        S: DrawSurface<Image = L::Image>,
    {
        let Some(descriptor) = &self.descriptor else {
            return Ok(());
        };
        let metrics = self.metrics;
        let scale = zoom.min(LABEL_MAX_SCALE);
        for (rx, ry) in metrics.visible_regions(view, metrics.region_tiles()) {
            for label in descriptor.labels_in(self.plane, rx, ry) {
                let Some(image) = self.labels.get_or_request(label.label_id, load_new, &self.loader) else {
                    continue;
                };
                let width = image.width / scale;
                let height = image.height / scale;
                let (x, y) = metrics.world_to_canvas(label.x as f64 + 0.5, label.y as f64 + 1.0);
                let dst = Rect::new((x - width / 2.0).round(), y, width.round(), height.round());
                surface.draw_image(&image.image, dst)?;
            }
        }
        Ok(())
    }

    fn draw_cursor_tile<S: DrawSurface>(&self, surface: &mut S) {
        let Some((x, y)) = self.hover_tile else {
            return;
        };
        let origin = square_origin(&self.metrics, x as f64, y as f64);
        surface.stroke_fill_squares(
            &[origin],
            self.metrics.pixels_per_tile,
            PLAYER_STYLE.fill,
            PLAYER_STYLE.stroke,
        );
    }
}

/// Stand-in for a player with no position yet; never drawn.
const UNKNOWN: Coordinates = Coordinates {
    x: f64::NAN,
    y: f64::NAN,
    plane: f64::NAN,
};

fn log_layer(layer: &'static str, result: Result<(), SurfaceError>) {
    if let Err(err) = result {
        tracing::warn!(layer, %err, "map layer failed to draw");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::surface::recording::{DrawOp, RecordingSurface};
    use crate::tiles::tests::{FakeLoader, image};

    const FRAME: f64 = 16.0;

    fn view() -> (MapView<FakeLoader>, AssetInbox<&'static str>) {
        let clock = FrameClock::new();
        let inbox = AssetInbox::new(clock.clone());
        let view = MapView::new(FakeLoader::default(), inbox.clone(), clock, 1000.0, 1000.0);
        (view, inbox)
    }

    fn run(view: &mut MapView<FakeLoader>, frames: usize) -> RecordingSurface {
        let mut surface = RecordingSurface::new();
        for _ in 0..frames {
            view.step(FRAME, &mut surface);
        }
        surface
    }

    fn with_alice(view: &mut MapView<FakeLoader>, plane: f64) {
        view.handle_group_event(&GroupEvent::MembersUpdated(json!([{ "name": "alice" }])));
        view.handle_group_event(&GroupEvent::CoordinatesUpdated(
            json!({ "name": "alice", "x": 3200, "y": 3210, "plane": plane }),
        ));
    }

    #[test]
    fn starts_centred_on_default_tile() {
        let (view, _) = view();
        assert_eq!(view.tile_at_client(500.0, 500.0), (3103, 3095));
        assert_eq!(view.plane(), 0);
        assert_eq!(view.camera().zoom.current, 1.0);
    }

    #[test]
    fn wheel_zoom_keeps_point_under_cursor() {
        let (mut view, _) = view();
        view.camera = Camera::new(0.0, 0.0, 1.0, MIN_ZOOM, MAX_ZOOM);
        let metrics = MapMetrics::default();
        let before = metrics.client_to_world(500.0, 500.0, &view.camera.state(1000.0, 1000.0));

        view.wheel(-100.0, 500.0, 500.0);
        assert_eq!(view.camera.zoom.target, 1.0 + 51.0 / 256.0);
        run(&mut view, 20);

        assert!(!view.camera.zoom.is_animating());
        let (sx, sy) = metrics.world_to_client(before.0, before.1, &view.camera.state(1000.0, 1000.0));
        assert!((sx - 500.0).abs() <= 1.0, "x moved to {sx}");
        assert!((sy - 500.0).abs() <= 1.0, "y moved to {sy}");
    }

    #[test]
    fn wheel_is_ignored_while_dragging_or_with_zero_delta() {
        let (mut view, _) = view();
        view.wheel(0.0, 10.0, 10.0);
        assert!(!view.camera.zoom.is_animating());
        view.pointer_down(10.0, 10.0, 0.0);
        view.wheel(-100.0, 10.0, 10.0);
        assert_eq!(view.camera.zoom.target, 1.0);
    }

    #[test]
    fn drag_tracks_one_to_one_then_coasts_to_a_stop() {
        let (mut view, _) = view();
        let (x0, y0) = (view.camera.x.target, view.camera.y.target);

        view.pointer_down(100.0, 100.0, 1000.0);
        view.pointer_move(80.0, 130.0, 1016.0);
        assert_eq!(view.camera.x.target, x0 + 20.0);
        assert_eq!(view.camera.y.target, y0 - 30.0);
        view.pointer_up(1016.0);
        assert!(view.gestures.momentum.is_moving());

        let mut surface = RecordingSurface::new();
        let mut last_x = view.camera.x.current;
        for _ in 0..10 {
            assert!(view.step(FRAME, &mut surface));
            assert!(view.camera.x.current > last_x);
            last_x = view.camera.x.current;
        }
        let mut frames = 10;
        while view.gestures.momentum.is_moving() {
            view.step(FRAME, &mut surface);
            frames += 1;
            assert!(frames < 125, "still coasting after 2s");
        }
        let settled = view.camera.x.current;
        view.step(FRAME, &mut surface);
        assert_eq!(view.camera.x.current, settled);
    }

    #[test]
    fn press_without_travel_reports_clicked_tile() {
        let (mut view, _) = view();
        view.pointer_down(500.0, 500.0, 0.0);
        view.pointer_move(502.0, 501.0, 10.0);
        view.take_notifications();
        view.pointer_up(20.0);
        assert_eq!(
            view.take_notifications(),
            vec![MapNotification::TileClicked { x: 3103, y: 3095, plane: 0 }]
        );
    }

    #[test]
    fn cancelled_drag_is_not_a_click_and_does_not_coast() {
        let (mut view, _) = view();
        view.pointer_down(500.0, 500.0, 0.0);
        view.pointer_move(503.0, 500.0, 10.0);
        view.take_notifications();
        view.cancel_drag();
        assert!(!view.camera.is_dragging);
        assert!(!view.gestures.momentum.is_moving());
        assert!(view.take_notifications().is_empty());
        // Nothing left to release.
        view.pointer_up(20.0);
        assert!(view.take_notifications().is_empty());
    }

    #[test]
    fn cancelled_touch_is_not_a_click() {
        let (mut view, _) = view();
        view.touch_start(&[(500.0, 500.0)], 0.0);
        view.touch_cancel();
        view.touch_end(&[], 20.0);
        assert!(
            !view
                .take_notifications()
                .iter()
                .any(|n| matches!(n, MapNotification::TileClicked { .. }))
        );
        assert!(!view.camera.is_dragging);
    }

    #[test]
    fn second_finger_turns_drag_into_pinch_without_click() {
        let (mut view, _) = view();
        view.touch_start(&[(500.0, 500.0)], 0.0);
        view.touch_start(&[(500.0, 500.0), (600.0, 500.0)], 10.0);
        assert!(!view.camera.is_dragging);
        assert!(view.gestures.pinch.is_some());
        view.touch_end(&[(600.0, 500.0)], 20.0);
        view.touch_end(&[], 30.0);
        assert!(
            !view
                .take_notifications()
                .iter()
                .any(|n| matches!(n, MapNotification::TileClicked { .. }))
        );
    }

    #[test]
    fn unknown_player_coordinates_do_not_request_a_frame() {
        let (mut view, _) = view();
        view.handle_group_event(&GroupEvent::MembersUpdated(json!([{ "name": "alice" }])));
        let mut t = 0.0;
        while view.clock.pending() > 0 {
            t += FRAME;
            view.clock.begin_frame(t);
        }
        view.handle_group_event(&GroupEvent::CoordinatesUpdated(
            json!({ "name": "mallory", "x": 1, "y": 1, "plane": 0 }),
        ));
        view.handle_group_event(&GroupEvent::CoordinatesUpdated(json!("nope")));
        assert_eq!(view.clock.pending(), 0);
        view.handle_group_event(&GroupEvent::CoordinatesUpdated(
            json!({ "name": "alice", "x": 1, "y": 1, "plane": 0 }),
        ));
        assert_eq!(view.clock.pending(), 1);
    }

    #[test]
    fn resize_requests_a_frame_and_moves_the_centre() {
        let (mut view, _) = view();
        let mut t = 0.0;
        while view.clock.pending() > 0 {
            t += FRAME;
            view.clock.begin_frame(t);
        }
        let before = view.tile_at_client(500.0, 500.0);
        view.resize(2000.0, 1000.0);
        assert_eq!(view.clock.pending(), 1);
        assert_eq!(view.tile_at_client(500.0, 500.0), before);
        assert_ne!(view.tile_at_client(1000.0, 500.0), before);
    }

    #[test]
    fn hover_reports_only_tile_changes() {
        let (mut view, _) = view();
        view.pointer_move(500.0, 500.0, 0.0);
        view.pointer_move(501.0, 500.0, 5.0);
        assert_eq!(
            view.take_notifications(),
            vec![MapNotification::HoverChanged { x: 3103, y: 3095 }]
        );
        assert_eq!(view.hover_tile(), Some((3103, 3095)));
    }

    #[test]
    fn drag_cancels_follow() {
        let (mut view, _) = view();
        with_alice(&mut view, 0.0);
        assert!(view.follow_player("alice"));
        view.pointer_down(0.0, 0.0, 0.0);
        assert_eq!(view.markers().following(), None);
    }

    #[test]
    fn following_retargets_and_switches_plane() {
        let (mut view, _) = view();
        with_alice(&mut view, 2.0);
        assert!(view.follow_player("alice"));
        run(&mut view, 15);
        assert_eq!(view.tile_at_client(500.0, 500.0), (3200, 3210));
        assert_eq!(view.plane(), 2);
        assert_eq!(view.take_notifications(), vec![MapNotification::PlaneChanged(2)]);
    }

    #[test]
    fn nan_plane_update_does_not_retarget_follow() {
        let (mut view, _) = view();
        with_alice(&mut view, 0.0);
        assert!(view.follow_player("alice"));
        run(&mut view, 15);
        let (tx, ty) = (view.camera.x.target, view.camera.y.target);

        view.handle_group_event(&GroupEvent::CoordinatesUpdated(
            json!({ "name": "alice", "x": 3300, "y": 3300, "plane": "NaN" }),
        ));
        run(&mut view, 5);
        assert_eq!((view.camera.x.target, view.camera.y.target), (tx, ty));
        assert_eq!(view.markers().following(), Some("alice"));
    }

    #[test]
    fn malformed_member_list_clears_markers_without_panicking() {
        let (mut view, _) = view();
        with_alice(&mut view, 0.0);
        for payload in [serde_json::Value::Null, json!({}), json!("alice")] {
            view.handle_group_event(&GroupEvent::MembersUpdated(payload));
            assert_eq!(view.markers().players().count(), 0);
        }
        let surface = run(&mut view, 1);
        assert!(surface.texts().is_empty());
    }

    #[test]
    fn region_missing_from_descriptor_is_cleared_not_fetched() {
        let (mut view, inbox) = view();
        let mut descriptor = MapDescriptor::default();
        descriptor.insert_tile(RegionCoord::new(0, 48, 48));
        inbox.push(AssetEvent::Descriptor(Box::new(descriptor)));

        // Centre region (50, 50) on screen.
        view.center_on(3232.0, 3232.0, 0.0);
        let surface = run(&mut view, 1);

        let requested = view.loader.requested.borrow();
        assert!(!requested.contains(&AssetKey::Tile(RegionCoord::new(0, 50, 50))));
        assert!(requested.iter().all(|key| matches!(
            key,
            AssetKey::Tile(r) if *r == RegionCoord::new(0, 48, 48)
        ) || *key == AssetKey::IconAtlas));

        let metrics = MapMetrics::default();
        let (ox, oy) = metrics.region_origin(50, 50);
        assert!(surface.clears().contains(&Rect::new(ox, oy, 256.0, 256.0)));
    }

    #[test]
    fn every_visible_region_is_tried_before_descriptor() {
        let (mut view, _) = view();
        view.center_on(3232.0, 3232.0, 0.0);
        run(&mut view, 1);
        assert!(
            view.loader
                .requested
                .borrow()
                .contains(&AssetKey::Tile(RegionCoord::new(0, 50, 50)))
        );
    }

    #[test]
    fn loaded_tile_fades_in_and_draws() {
        let (mut view, inbox) = view();
        view.center_on(3232.0, 3232.0, 0.0);
        run(&mut view, 1);
        let region = RegionCoord::new(0, 50, 50);
        inbox.push(AssetEvent::Loaded(AssetKey::Tile(region), image("tile-50-50")));

        let mut surface = RecordingSurface::new();
        assert!(view.step(FRAME, &mut surface));
        assert!(surface.images().contains(&"tile-50-50"));
        let mut frames = 0;
        while view.step(FRAME, &mut surface) {
            frames += 1;
            assert!(frames < 40);
        }
        let mut steady = RecordingSurface::new();
        view.step(FRAME, &mut steady);
        let (ox, oy) = MapMetrics::default().region_origin(50, 50);
        assert!(steady.ops.contains(&DrawOp::Image("tile-50-50", Rect::new(ox, oy, 256.0, 256.0))));
        assert!(!steady.clears().contains(&Rect::new(ox, oy, 256.0, 256.0)));
    }

    #[test]
    fn fast_pan_holds_back_new_loads() {
        let (mut view, _) = view();
        run(&mut view, 1);
        let before = view.loader.requested.borrow().len();
        view.center_on(1000.0, 9000.0, 100.0);
        view.step(FRAME, &mut RecordingSurface::new());
        assert!(view.camera.is_panning_big());
        assert_eq!(view.loader.requested.borrow().len(), before);
    }

    #[test]
    fn failing_layer_does_not_stop_later_layers() {
        let (mut view, inbox) = view();
        with_alice(&mut view, 0.0);
        view.center_on(3200.0, 3210.0, 0.0);
        run(&mut view, 1);
        let region = RegionCoord::new(0, 50, 50);
        inbox.push(AssetEvent::Loaded(AssetKey::Tile(region), image("tile")));

        let mut surface = RecordingSurface::new();
        surface.fail_images = true;
        view.step(FRAME, &mut surface);
        assert!(surface.images().is_empty());
        assert_eq!(surface.texts().first().map(|t| t.0.as_str()), Some("alice"));
    }

    #[test]
    fn draws_layers_in_order() {
        let (mut view, inbox) = view();
        let mut descriptor: MapDescriptor = serde_json::from_value(json!({
            "tiles": [[], [], [], []],
            "icons": { "0": { "48": { "48": { "2": [3103, 3095] } } } },
            "labels": { "0": { "48": { "48": [3104, 3096, 5] } } }
        }))
        .expect("descriptor parses");
        descriptor.insert_tile(RegionCoord::new(0, 48, 48));
        inbox.push(AssetEvent::Descriptor(Box::new(descriptor)));
        run(&mut view, 1);
        inbox.push(AssetEvent::Loaded(AssetKey::IconAtlas, image("atlas")));
        inbox.push(AssetEvent::Loaded(AssetKey::Label(5), image("label-5")));
        inbox.push(AssetEvent::Loaded(
            AssetKey::Tile(RegionCoord::new(0, 48, 48)),
            image("tile"),
        ));
        view.add_interacting_marker(3103.0, 3095.0, "Goblin");
        with_alice(&mut view, 0.0);
        view.pointer_move(500.0, 500.0, 0.0);

        let surface = run(&mut view, 1);
        assert!(matches!(surface.ops.first(), Some(DrawOp::Transform(_))));
        assert_eq!(surface.images(), vec!["tile", "atlas", "label-5"]);

        let squares: Vec<_> = surface
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Squares { fill, .. } => Some(fill.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(squares, ["#348feb", "#a832a8", "#348feb"]);
        let texts: Vec<_> = surface.texts().into_iter().map(|t| t.0).collect();
        assert_eq!(texts, ["alice", "Goblin"]);

        // Icon sprite 2 is cut from the atlas at 30px and centred on its tile.
        let sprite = surface.ops.iter().find_map(|op| match op {
            DrawOp::Sprite(_, src, dst) => Some((*src, *dst)),
            _ => None,
        });
        let (cx, cy) = MapMetrics::default().world_to_canvas(3103.5, 3095.5);
        assert_eq!(
            sprite,
            Some((
                Rect::new(30.0, 0.0, 15.0, 15.0),
                Rect::new((cx - 7.5).round(), (cy - 7.5).round(), 15.0, 15.0)
            ))
        );
    }

    #[test]
    fn show_plane_notifies_once() {
        let (mut view, _) = view();
        assert!(view.show_plane(1));
        assert!(!view.show_plane(1));
        assert!(!view.show_plane(4));
        assert_eq!(view.take_notifications(), vec![MapNotification::PlaneChanged(1)]);
    }

    #[test]
    fn interacting_markers_can_be_removed() {
        let (mut view, _) = view();
        let handle = view.add_interacting_marker(3103.0, 3095.0, "Chest");
        assert!(view.remove_interacting_marker(handle));
        let surface = run(&mut view, 1);
        assert!(surface.texts().is_empty());
    }

    #[test]
    fn pinch_zooms_in_log_space_around_midpoint() {
        let (mut view, _) = view();
        let metrics = MapMetrics::default();
        let cam = view.camera.state(1000.0, 1000.0);
        let anchor = metrics.client_to_world(500.0, 500.0, &cam);

        view.touch_start(&[(450.0, 500.0), (550.0, 500.0)], 0.0);
        view.touch_move(&[(400.0, 500.0), (600.0, 500.0)], 16.0);
        assert_eq!(view.camera.zoom.current, 2.0);
        let (sx, sy) = metrics.world_to_client(anchor.0, anchor.1, &view.camera.state(1000.0, 1000.0));
        assert!((sx - 500.0).abs() <= 1.0 && (sy - 500.0).abs() <= 1.0);

        view.touch_end(&[(600.0, 500.0)], 32.0);
        assert!(view.gestures.pinch.is_none());
    }

    #[test]
    fn prefs_restore_round_trip() {
        let (mut view, _) = view();
        view.restore(MapPrefs {
            plane: 1,
            center_x: 3222.0,
            center_y: 3218.0,
            zoom: 2.5,
        });
        let prefs = view.prefs();
        assert_eq!(prefs.plane, 1);
        assert!((prefs.center_x - 3222.0).abs() < 1e-6);
        assert!((prefs.center_y - 3218.0).abs() < 1e-6);
        assert_eq!(prefs.zoom, 2.5);
        assert_eq!(view.tile_at_client(500.0, 500.0), (3222, 3218));
    }
}
