//! Paint an edge mask onto a transparent RGBA canvas.

use image::{Rgba, RgbaImage};

use super::canny::EdgeMap;

/// Fully transparent pixel used for every non-edge position.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Opaque color painted onto edge pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl LabelColor {
    pub const BLUE: LabelColor = LabelColor::opaque(0, 0, 255);
    pub const YELLOW: LabelColor = LabelColor::opaque(255, 255, 0);

    pub const fn opaque(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// The color as an RGBA pixel with full opacity.
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.red, self.green, self.blue, 255])
    }
}

/// Build a canvas the size of `edges`: transparent everywhere except edge
/// pixels, which take `color`.
pub fn recolor(edges: &EdgeMap, color: LabelColor) -> RgbaImage {
    let (width, height) = edges.dimensions();
    let paint = color.to_rgba();
    RgbaImage::from_fn(width, height, |x, y| {
        if edges.is_edge(x, y) {
            paint
        } else {
            TRANSPARENT
        }
    })
}
