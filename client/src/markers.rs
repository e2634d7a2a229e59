use std::collections::{BTreeMap, BTreeSet, HashMap};

use groupiron_shared::{
    Coordinates, PLANE_COUNT, Rejection, parse_coordinate_update, parse_member_list,
};
use serde_json::Value;

use crate::surface::{DrawSurface, SurfaceError};
use crate::transform::MapMetrics;

/// Identifies an interacting marker for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMarker {
    pub name: String,
    /// `None` until the first coordinate update for this player.
    pub coordinates: Option<Coordinates>,
}

impl PlayerMarker {
    pub fn valid_coordinates(&self) -> Option<Coordinates> {
        self.coordinates.filter(Coordinates::is_valid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractingMarker {
    pub handle: MarkerHandle,
    pub label: String,
    pub coordinates: Coordinates,
}

/// Outcome of a coordinate update that parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateOutcome {
    Applied,
    /// The name is not in the current roster.
    NotInRoster,
}

/// Live player positions, ad-hoc markers, and who the camera follows.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    roster: Option<BTreeSet<String>>,
    players: BTreeMap<String, PlayerMarker>,
    interacting: BTreeMap<MarkerHandle, InteractingMarker>,
    next_handle: u64,
    following: Option<String>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster. A rejected payload empties it.
    pub fn apply_members(&mut self, payload: &Value) -> Result<usize, Rejection> {
        let names: BTreeSet<String> = match parse_member_list(payload) {
            Ok(members) => members
                .into_iter()
                .filter(|member| !member.is_shared())
                .map(|member| member.name)
                .collect(),
            Err(rejection) => {
                self.roster = Some(BTreeSet::new());
                self.players.clear();
                self.following = None;
                return Err(rejection);
            }
        };

        self.players.retain(|name, _| names.contains(name));
        for name in &names {
            self.players
                .entry(name.clone())
                .or_insert_with(|| PlayerMarker {
                    name: name.clone(),
                    coordinates: None,
                });
        }
        if self
            .following
            .as_ref()
            .is_some_and(|name| !names.contains(name))
        {
            self.following = None;
        }
        let count = names.len();
        self.roster = Some(names);
        Ok(count)
    }

    /// Upsert a player's position. Rejected payloads change nothing.
    pub fn apply_coordinates(&mut self, payload: &Value) -> Result<CoordinateOutcome, Rejection> {
        let update = parse_coordinate_update(payload)?;
        if self
            .roster
            .as_ref()
            .is_some_and(|roster| !roster.contains(&update.name))
        {
            return Ok(CoordinateOutcome::NotInRoster);
        }
        let marker = self
            .players
            .entry(update.name.clone())
            .or_insert_with(|| PlayerMarker {
                name: update.name,
                coordinates: None,
            });
        marker.coordinates = Some(update.coordinates);
        Ok(CoordinateOutcome::Applied)
    }

    pub fn player(&self, name: &str) -> Option<&PlayerMarker> {
        self.players.get(name)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerMarker> {
        self.players.values()
    }

    /// Start following `name`. Only players with a valid position can be
    /// followed.
    pub fn follow(&mut self, name: &str) -> bool {
        let followable = self
            .players
            .get(name)
            .and_then(PlayerMarker::valid_coordinates)
            .is_some();
        if followable {
            self.following = Some(name.to_string());
        }
        followable
    }

    pub fn stop_following(&mut self) {
        self.following = None;
    }

    pub fn following(&self) -> Option<&str> {
        self.following.as_deref()
    }

    /// Latest valid position of the followed player, if any.
    pub fn follow_target(&self) -> Option<Coordinates> {
        let name = self.following.as_ref()?;
        self.players.get(name)?.valid_coordinates()
    }

    /// Interacting markers always sit on plane 0.
    pub fn add_interacting(&mut self, x: f64, y: f64, label: &str) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        self.interacting.insert(
            handle,
            InteractingMarker {
                handle,
                label: label.to_string(),
                coordinates: Coordinates::new(x, y, 0.0),
            },
        );
        handle
    }

    pub fn remove_interacting(&mut self, handle: MarkerHandle) -> bool {
        self.interacting.remove(&handle).is_some()
    }

    pub fn interacting(&self) -> impl Iterator<Item = &InteractingMarker> {
        self.interacting.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPosition {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStyle {
    pub fill: &'static str,
    pub stroke: &'static str,
    pub label_position: LabelPosition,
    pub label_fill: &'static str,
    pub label_stroke: &'static str,
}

pub const PLAYER_STYLE: MarkerStyle = MarkerStyle {
    fill: "#348feb",
    stroke: "#34d8eb",
    label_position: LabelPosition::Top,
    label_fill: "yellow",
    label_stroke: "black",
};

pub const INTERACTING_STYLE: MarkerStyle = MarkerStyle {
    fill: "#a832a8",
    stroke: "#cc2ed1",
    label_position: LabelPosition::Bottom,
    label_fill: "red",
    label_stroke: "black",
};

const LABEL_FONT_PX: f64 = 20.0;
const LABEL_LINE_PX: f64 = 18.0;

/// Opacity for a marker `|delta|` planes away from the one on screen.
pub fn plane_alpha(view_plane: u8, marker_plane: u8) -> f64 {
    let delta = (view_plane as f64 - marker_plane as f64).abs();
    (1.0 - 0.25 * delta).max(0.0)
}

/// One labelled square to draw.
#[derive(Debug, Clone, Copy)]
pub struct MarkerGlyph<'a> {
    pub label: &'a str,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel<'a> {
    pub text: &'a str,
    pub x: f64,
    pub y: f64,
}

/// Top-left canvas corner of the square for world tile `(x, y)`.
pub fn square_origin(metrics: &MapMetrics, x: f64, y: f64) -> (f64, f64) {
    metrics.world_to_canvas(x.floor(), y.floor() + 1.0)
}

/// Stack labels of markers sharing a tile so they do not overlap. Offsets
/// are in screen pixels divided by `zoom`.
pub fn layout_labels<'a>(
    metrics: &MapMetrics,
    glyphs: &[MarkerGlyph<'a>],
    position: LabelPosition,
    zoom: f64,
) -> Vec<PlacedLabel<'a>> {
    let step = LABEL_LINE_PX / zoom;
    let mut next_offset: HashMap<(i64, i64), f64> = HashMap::new();
    let mut placed = Vec::with_capacity(glyphs.len());
    for glyph in glyphs {
        let (x, y) = (glyph.coordinates.x, glyph.coordinates.y);
        let (px, py) = square_origin(metrics, x, y);
        let offset = next_offset
            .entry((x.floor() as i64, y.floor() as i64))
            .or_insert(match position {
                LabelPosition::Top => 0.0,
                LabelPosition::Bottom => metrics.pixels_per_tile + step,
            });
        placed.push(PlacedLabel {
            text: glyph.label,
            x: px + metrics.pixels_per_tile / 2.0,
            y: py + *offset,
        });
        *offset += match position {
            LabelPosition::Top => -step,
            LabelPosition::Bottom => step,
        };
    }
    placed
}

/// Draw one marker category, plane by plane, with distance-faded alpha.
/// Markers without a valid position are skipped.
pub fn draw_markers<'a, S: DrawSurface>(
    surface: &mut S,
    metrics: &MapMetrics,
    glyphs: impl IntoIterator<Item = MarkerGlyph<'a>>,
    style: &MarkerStyle,
    view_plane: u8,
    zoom: f64,
) -> Result<(), SurfaceError> {
    let mut by_plane: Vec<Vec<MarkerGlyph<'a>>> = vec![Vec::new(); PLANE_COUNT];
    for glyph in glyphs {
        if glyph.coordinates.is_valid()
            && let Some(plane) = glyph.coordinates.plane_index()
        {
            by_plane[plane as usize].push(glyph);
        }
    }

    let result = by_plane
        .iter()
        .enumerate()
        .filter(|(_, glyphs)| !glyphs.is_empty())
        .try_for_each(|(plane, glyphs)| {
            surface.set_alpha(plane_alpha(view_plane, plane as u8));
            draw_plane(surface, metrics, glyphs, style, zoom)
        });
    surface.set_alpha(1.0);
    result
}

fn draw_plane<S: DrawSurface>(
    surface: &mut S,
    metrics: &MapMetrics,
    glyphs: &[MarkerGlyph<'_>],
    style: &MarkerStyle,
    zoom: f64,
) -> Result<(), SurfaceError> {
    let origins: Vec<_> = glyphs
        .iter()
        .map(|g| square_origin(metrics, g.coordinates.x, g.coordinates.y))
        .collect();
    surface.stroke_fill_squares(&origins, metrics.pixels_per_tile, style.fill, style.stroke);

    surface.set_text_style(&format!("{}px rssmall", LABEL_FONT_PX / zoom), 1.0 / zoom);
    let outline = 1.0 / zoom;
    for label in layout_labels(metrics, glyphs, style.label_position, zoom) {
        surface.stroke_text(label.text, label.x + outline, label.y + outline, style.label_stroke)?;
        surface.fill_text(label.text, label.x, label.y, style.label_fill)?;
    }
    Ok(())
}
