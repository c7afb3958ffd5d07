//! Canny edge detector.
//!
//! The detector runs in three passes:
//!
//! 1. Sobel gradients with a configurable aperture (3, 5 or 7)
//! 2. Non-maximum suppression along the quantized gradient direction
//! 3. Hysteresis: magnitudes above `high` seed edges, magnitudes in
//!    `(low, high]` are kept only when 8-connected to a seed
//!
//! Image borders are replicated when computing gradients.

use image::{GrayImage, Luma};

use crate::error::PipelineError;

/// Value written to the edge mask for edge pixels.
pub const EDGE: u8 = 255;

/// tan(22.5°) and tan(67.5°), the boundaries between direction bins.
const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

/// Two-threshold edge detector settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyParams {
    /// Gradient magnitude at or below which a pixel is never an edge
    pub low: f32,

    /// Gradient magnitude above which a pixel is always an edge
    pub high: f32,

    /// Sobel kernel size: 3, 5 or 7
    pub aperture: u32,

    /// Use `sqrt(gx² + gy²)` instead of `|gx| + |gy|`
    pub l2_gradient: bool,
}

impl CannyParams {
    pub fn new(low: f32, high: f32, aperture: u32, l2_gradient: bool) -> Self {
        Self {
            low,
            high,
            aperture,
            l2_gradient,
        }
    }

    /// Reject apertures the Sobel operator does not support.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if sobel_kernels(self.aperture).is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "Sobel aperture must be 3, 5 or 7, got {}",
                self.aperture
            )));
        }
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(PipelineError::InvalidConfig(
                "Canny thresholds must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Thresholds ordered as `(low, high)`.
    fn ordered_thresholds(&self) -> (f32, f32) {
        if self.low > self.high {
            (self.high, self.low)
        } else {
            (self.low, self.high)
        }
    }
}

/// Binary edge mask with the dimensions of its source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap {
    mask: GrayImage,
}

impl EdgeMap {
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Whether the pixel at `(x, y)` is an edge.
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.mask.get_pixel(x, y).0[0] == EDGE
    }

    /// Number of edge pixels.
    pub fn edge_count(&self) -> usize {
        self.mask.as_raw().iter().filter(|&&v| v == EDGE).count()
    }

    /// The mask as a grayscale image (0 or 255).
    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }
}

/// Separable Sobel kernels `(smoothing, derivative)` for an aperture.
fn sobel_kernels(aperture: u32) -> Option<(&'static [f32], &'static [f32])> {
    match aperture {
        3 => Some((&[1.0, 2.0, 1.0], &[-1.0, 0.0, 1.0])),
        5 => Some((&[1.0, 4.0, 6.0, 4.0, 1.0], &[-1.0, -2.0, 0.0, 2.0, 1.0])),
        7 => Some((
            &[1.0, 6.0, 15.0, 20.0, 15.0, 6.0, 1.0],
            &[-1.0, -4.0, -5.0, 0.0, 5.0, 4.0, 1.0],
        )),
        _ => None,
    }
}

/// Convolve rows with `horizontal` and columns with `vertical`.
fn separable(
    src: &[f32],
    w: usize,
    h: usize,
    horizontal: &[f32],
    vertical: &[f32],
) -> Vec<f32> {
    let hr = (horizontal.len() / 2) as isize;
    let vr = (vertical.len() / 2) as isize;
    let clamp = |i: isize, len: usize| i.clamp(0, len as isize - 1) as usize;

    let mut tmp = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in horizontal.iter().enumerate() {
                let sx = clamp(x as isize + k as isize - hr, w);
                acc += weight * src[y * w + sx];
            }
            tmp[y * w + x] = acc;
        }
    }

    let mut out = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in vertical.iter().enumerate() {
                let sy = clamp(y as isize + k as isize - vr, h);
                acc += weight * tmp[sy * w + x];
            }
            out[y * w + x] = acc;
        }
    }
    out
}

/// Horizontal and vertical Sobel derivatives.
pub fn sobel_gradients(image: &GrayImage, aperture: u32) -> Result<(Vec<f32>, Vec<f32>), PipelineError> {
    let (smooth, deriv) = sobel_kernels(aperture).ok_or_else(|| {
        PipelineError::InvalidConfig(format!(
            "Sobel aperture must be 3, 5 or 7, got {}",
            aperture
        ))
    })?;
    let (w, h) = (image.width() as usize, image.height() as usize);
    let src: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();

    let gx = separable(&src, w, h, deriv, smooth);
    let gy = separable(&src, w, h, smooth, deriv);
    Ok((gx, gy))
}

/// Run Canny edge detection on a grayscale image.
pub fn canny(image: &GrayImage, params: &CannyParams) -> Result<EdgeMap, PipelineError> {
    params.validate()?;

    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Ok(EdgeMap {
            mask: GrayImage::new(width, height),
        });
    }

    let (low, high) = params.ordered_thresholds();
    let (gx, gy) = sobel_gradients(image, params.aperture)?;

    let magnitude: Vec<f32> = gx
        .iter()
        .zip(&gy)
        .map(|(&dx, &dy)| {
            if params.l2_gradient {
                (dx * dx + dy * dy).sqrt()
            } else {
                dx.abs() + dy.abs()
            }
        })
        .collect();

    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    // Non-maximum suppression. 0 = none, 1 = weak, 2 = strong.
    let mut class = vec![0u8; w * h];
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let (dx, dy) = (gx[idx], gy[idx]);
            let (ax, ay) = (dx.abs(), dy.abs());
            let (xi, yi) = (x as isize, y as isize);

            let (n1, n2) = if ay <= ax * TAN_22_5 {
                (mag_at(xi - 1, yi), mag_at(xi + 1, yi))
            } else if ay > ax * TAN_67_5 {
                (mag_at(xi, yi - 1), mag_at(xi, yi + 1))
            } else if (dx > 0.0) == (dy > 0.0) {
                (mag_at(xi - 1, yi - 1), mag_at(xi + 1, yi + 1))
            } else {
                (mag_at(xi + 1, yi - 1), mag_at(xi - 1, yi + 1))
            };

            if m > n1 && m >= n2 {
                if m > high {
                    class[idx] = 2;
                    stack.push(idx);
                } else {
                    class[idx] = 1;
                }
            }
        }
    }

    // Hysteresis: grow strong edges through connected weak pixels.
    while let Some(idx) = stack.pop() {
        let (x, y) = ((idx % w) as isize, (idx / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if class[n] == 1 {
                    class[n] = 2;
                    stack.push(n);
                }
            }
        }
    }

    let mask = GrayImage::from_fn(width, height, |x, y| {
        if class[y as usize * w + x as usize] == 2 {
            Luma([EDGE])
        } else {
            Luma([0])
        }
    });

    Ok(EdgeMap { mask })
}
