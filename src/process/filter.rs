//! Denoising filters applied before edge detection.
//!
//! Both filters operate on 8-bit grayscale images and return a new image of
//! the same dimensions. Borders are handled by reflecting about the edge
//! pixel (`gfedcb|abcdefgh|gfedcba`).

use image::GrayImage;

/// Smoothing stage of a variant recipe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Denoise {
    /// Leave the source untouched
    None,

    /// Separable Gaussian blur with an odd kernel size.
    ///
    /// A `sigma` of zero or less derives the kernel from its size alone.
    Gaussian { ksize: u32, sigma: f32 },

    /// Edge-preserving bilateral filter.
    ///
    /// `diameter` is the width of the pixel neighbourhood; a value of zero
    /// derives it from `sigma_space`.
    Bilateral {
        diameter: u32,
        sigma_color: f32,
        sigma_space: f32,
    },
}

impl Denoise {
    /// Run this stage on `image`.
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        match *self {
            Denoise::None => image.clone(),
            Denoise::Gaussian { ksize, sigma } => gaussian_blur(image, ksize, sigma),
            Denoise::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => bilateral_filter(image, diameter, sigma_color, sigma_space),
        }
    }
}

/// Map an out-of-range coordinate back into `0..len` by reflection,
/// excluding the border pixel itself.
#[inline]
pub(crate) fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * n - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Sigma used when a Gaussian is requested with a non-positive sigma.
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Fixed binomial kernels used for small sizes when sigma is derived.
const SMALL_GAUSSIAN_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
    ],
];

/// Normalized 1-D Gaussian kernel of odd length `ksize`.
///
/// With a non-positive `sigma`, sizes 1, 3, 5 and 7 use binomial tables
/// (`[1, 4, 6, 4, 1] / 16` for 5) instead of sampling the Gaussian.
pub fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    if sigma <= 0.0 {
        if let Some(table) = SMALL_GAUSSIAN_KERNELS.get((ksize / 2) as usize) {
            return table.to_vec();
        }
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        sigma_for_kernel(ksize)
    };
    let radius = (ksize / 2) as i32;
    let denom = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Gaussian blur with an odd `ksize` x `ksize` kernel.
pub fn gaussian_blur(image: &GrayImage, ksize: u32, sigma: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let kernel = gaussian_kernel(ksize, sigma);
    let radius = (kernel.len() / 2) as isize;
    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();

    // Horizontal pass
    let mut tmp = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, w);
                acc += weight * row[sx] as f32;
            }
            tmp[y * w + x] = acc;
        }
    }

    // Vertical pass
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - radius, h);
                acc += weight * tmp[sy * w + x];
            }
            out[y * w + x] = saturate(acc);
        }
    }

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

/// Bilateral filter over a circular neighbourhood.
///
/// Each output pixel is the weighted mean of its neighbours, where the
/// weight falls off with both spatial distance (`sigma_space`) and
/// intensity difference (`sigma_color`). Strong gradients therefore survive
/// while flat regions are smoothed.
pub fn bilateral_filter(
    image: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let sigma_color = if sigma_color <= 0.0 { 1.0 } else { sigma_color };
    let sigma_space = if sigma_space <= 0.0 { 1.0 } else { sigma_space };
    let radius = if diameter == 0 {
        (sigma_space * 1.5).round() as isize
    } else {
        (diameter / 2) as isize
    }
    .max(1);

    // Spatial weights for every offset inside the circle
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f32;
            if dist2 > (radius * radius) as f32 {
                continue;
            }
            offsets.push((dx, dy, (dist2 * space_coeff).exp()));
        }
    }

    // Range weights for every possible intensity difference
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weights: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();
    let mut out = vec![0u8; w * h];

    for y in 0..h {
        for x in 0..w {
            let center = src[y * w + x];
            let mut sum = 0.0f32;
            let mut wsum = 0.0f32;
            for &(dx, dy, space_weight) in &offsets {
                let sx = reflect_101(x as isize + dx, w);
                let sy = reflect_101(y as isize + dy, h);
                let value = src[sy * w + sx];
                let weight = space_weight * color_weights[value.abs_diff(center) as usize];
                sum += weight * value as f32;
                wsum += weight;
            }
            out[y * w + x] = if wsum > 0.0 {
                saturate(sum / wsum)
            } else {
                center
            };
        }
    }

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

#[inline]
fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn step_image() -> GrayImage {
        GrayImage::from_fn(20, 10, |x, _| if x < 10 { Luma([20]) } else { Luma([220]) })
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 5), 3);
        assert_eq!(reflect_101(-7, 1), 0);
        assert!(reflect_101(-40, 3) < 3);
    }

    #[test]
    fn test_gaussian_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(5, 0.0);
        assert_eq!(kernel.len(), 5);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((kernel[0] - kernel[4]).abs() < 1e-6);
        assert!(kernel[2] > kernel[1]);
    }

    #[test]
    fn test_gaussian_kernel_derived_sigma_uses_binomial_table() {
        let kernel = gaussian_kernel(5, 0.0);
        let expected = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
        for (k, e) in kernel.iter().zip(expected) {
            assert!((k - e).abs() < 1e-7, "{:?}", kernel);
        }
        assert_eq!(gaussian_kernel(3, -1.0), vec![0.25, 0.5, 0.25]);
        assert_eq!(gaussian_kernel(1, 0.0), vec![1.0]);
        assert_eq!(gaussian_kernel(7, 0.0).len(), 7);

        // Explicit sigma and larger sizes still sample the Gaussian
        assert_ne!(gaussian_kernel(5, 1.1), kernel);
        let nine = gaussian_kernel(9, 0.0);
        assert_eq!(nine.len(), 9);
        assert!((nine.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_gaussian_kernel_even_size_rounds_up() {
        assert_eq!(gaussian_kernel(4, 1.0).len(), 5);
    }

    #[test]
    fn test_sigma_for_kernel() {
        assert!((sigma_for_kernel(5) - 1.1).abs() < 1e-6);
        assert!((sigma_for_kernel(3) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_gaussian_preserves_constant_image() {
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let blurred = gaussian_blur(&img, 5, 0.0);
        assert!(blurred.pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn test_gaussian_softens_step() {
        let blurred = gaussian_blur(&step_image(), 5, 0.0);
        let left = blurred.get_pixel(9, 5).0[0];
        let right = blurred.get_pixel(10, 5).0[0];
        assert!(left > 20 && left < 220);
        assert!(right > 20 && right < 220);
        assert_eq!(blurred.get_pixel(0, 0).0[0], 20);
    }

    #[test]
    fn test_bilateral_preserves_constant_image() {
        let img = GrayImage::from_pixel(12, 12, Luma([77]));
        let filtered = bilateral_filter(&img, 9, 75.0, 75.0);
        assert!(filtered.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn test_bilateral_keeps_strong_edge_sharper_than_gaussian() {
        let img = step_image();
        let bilateral = bilateral_filter(&img, 5, 20.0, 5.0);
        let gaussian = gaussian_blur(&img, 5, 0.0);

        let jump_bilateral = bilateral
            .get_pixel(10, 5)
            .0[0]
            .abs_diff(bilateral.get_pixel(9, 5).0[0]);
        let jump_gaussian = gaussian
            .get_pixel(10, 5)
            .0[0]
            .abs_diff(gaussian.get_pixel(9, 5).0[0]);
        assert!(jump_bilateral > jump_gaussian);
    }

    #[test]
    fn test_denoise_none_is_identity() {
        let img = step_image();
        assert_eq!(Denoise::None.apply(&img), img);
    }

    #[test]
    fn test_filters_keep_dimensions() {
        let img = GrayImage::from_pixel(1, 1, Luma([9]));
        assert_eq!(gaussian_blur(&img, 5, 0.0).dimensions(), (1, 1));
        assert_eq!(bilateral_filter(&img, 9, 75.0, 75.0).dimensions(), (1, 1));
    }
}
