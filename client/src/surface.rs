/// Failure reported by a drawing backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("draw call failed: {0}")]
pub struct SurfaceError(pub String);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// The subset of a 2D canvas context the map draws with.
///
/// Coordinates are in canvas pixels under the transform last passed to
/// [`DrawSurface::set_transform`].
pub trait DrawSurface {
    type Image;

    fn set_transform(&mut self, matrix: [f64; 6]) -> Result<(), SurfaceError>;

    fn set_alpha(&mut self, alpha: f64);

    fn clear_rect(&mut self, rect: Rect);

    fn draw_image(&mut self, image: &Self::Image, dst: Rect) -> Result<(), SurfaceError>;

    fn draw_sprite(&mut self, image: &Self::Image, src: Rect, dst: Rect) -> Result<(), SurfaceError>;

    /// Outline then fill a batch of equal squares as one path.
    fn stroke_fill_squares(&mut self, origins: &[(f64, f64)], size: f64, fill: &str, stroke: &str);

    /// Font, centred alignment and outline width for subsequent text.
    fn set_text_style(&mut self, font: &str, line_width: f64);

    fn stroke_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), SurfaceError>;

    fn fill_text(&mut self, text: &str, x: f64, y: f64, color: &str) -> Result<(), SurfaceError>;
}
