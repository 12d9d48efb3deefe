//! Perceptual image hash (pHash).
//!
//! The image is reduced to 32x32 luma, transformed with a 2-D DCT-II, and the
//! top-left 8x8 low-frequency block is compared against its median. The 64
//! resulting bits are rendered as 16 lowercase hex digits, first coefficient
//! in the most significant bit. Hashes are only ever compared for exact
//! equality; near-duplicates with a single differing bit are not caught.

use std::{f64::consts::PI, io::Cursor};

use {
    image::{GrayImage, ImageReader, Luma, imageops::FilterType},
    tracing::debug,
};

use crate::error::{Context, Result};

const SAMPLE_SIZE: u32 = 32;
const HASH_SIZE: usize = 8;

/// Decode `bytes` (any enabled format) and compute its perceptual hash.
pub fn perceptual_hash(bytes: &[u8]) -> Result<String> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(crate::Error::Message("image has no pixels".into()));
    }

    let luma = GrayImage::from_fn(width, height, |x, y| Luma([luma(rgb.get_pixel(x, y).0)]));
    let small = image::imageops::resize(&luma, SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Lanczos3);

    let n = SAMPLE_SIZE as usize;
    let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0])).collect();
    let coeffs = dct_2d(&pixels, n);

    let low: Vec<f64> = (0..HASH_SIZE)
        .flat_map(|row| (0..HASH_SIZE).map(move |col| (row, col)))
        .map(|(row, col)| coeffs[row * n + col])
        .collect();
    let med = median(&low).context("empty coefficient block")?;

    let bits = low
        .iter()
        .fold(0u64, |acc, c| (acc << 1) | u64::from(*c > med));
    let hash = format!("{bits:016x}");
    debug!(width, height, hash = %hash, "computed image fingerprint");
    Ok(hash)
}

/// ITU-R 601-2 luma in 16-bit fixed point, rounded to nearest. Matches the
/// grayscale conversion used by hashes stored in older route files.
fn luma([r, g, b]: [u8; 3]) -> u8 {
    let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
    u8::try_from(l).unwrap_or(u8::MAX)
}

/// Unnormalized DCT-II over rows then columns of an `n`x`n` block.
fn dct_2d(input: &[f64], n: usize) -> Vec<f64> {
    let cos_table: Vec<f64> = (0..n * n)
        .map(|i| {
            let (k, x) = (i / n, i % n);
            (PI * k as f64 * (2 * x + 1) as f64 / (2 * n) as f64).cos()
        })
        .collect();
    let dct_1d = |line: &[f64], out: &mut [f64]| {
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = 2.0
                * line
                    .iter()
                    .enumerate()
                    .map(|(x, v)| v * cos_table[k * n + x])
                    .sum::<f64>();
        }
    };

    // Columns first (axis 0), then rows (axis 1).
    let mut cols = vec![0.0; n * n];
    let mut line = vec![0.0; n];
    let mut out = vec![0.0; n];
    for col in 0..n {
        for row in 0..n {
            line[row] = input[row * n + col];
        }
        dct_1d(&line, &mut out);
        for row in 0..n {
            cols[row * n + col] = out[row];
        }
    }

    let mut result = vec![0.0; n * n];
    for row in 0..n {
        dct_1d(&cols[row * n..(row + 1) * n], &mut result[row * n..(row + 1) * n]);
    }
    result
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        image::{ImageFormat, RgbImage},
    };

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = u8::try_from((x * 255 / width.max(1) + y * 7) % 256).unwrap();
            image::Rgb([v, v / 2, 255 - v])
        })
    }

    #[rstest::rstest]
    #[case([0, 0, 0], 0)]
    #[case([255, 255, 255], 255)]
    #[case([0, 1, 0], 1)]
    #[case([10, 0, 0], 3)]
    #[case([0, 0, 5], 1)]
    #[case([100, 150, 200], 141)]
    fn luma_rounds_to_nearest(#[case] rgb: [u8; 3], #[case] expected: u8) {
        assert_eq!(luma(rgb), expected);
    }

    #[test]
    fn hash_is_sixteen_hex_digits() {
        let hash = perceptual_hash(&png(&gradient(64, 48))).unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn same_image_same_hash() {
        let bytes = png(&gradient(80, 80));
        assert_eq!(
            perceptual_hash(&bytes).unwrap(),
            perceptual_hash(&bytes).unwrap()
        );
    }

    #[test]
    fn different_images_differ() {
        let stripes = RgbImage::from_fn(64, 64, |x, _| {
            if (x / 8) % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let a = perceptual_hash(&png(&gradient(64, 64))).unwrap();
        let b = perceptual_hash(&png(&stripes)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(perceptual_hash(b"definitely not an image").is_err());
    }

    #[test]
    fn median_of_even_count_averages_middle() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn dct_of_constant_block_has_only_dc() {
        let n = 4;
        let coeffs = dct_2d(&vec![1.0; n * n], n);
        assert!((coeffs[0] - 4.0 * n as f64 * n as f64).abs() < 1e-9);
        assert!(coeffs[1..].iter().all(|c| c.abs() < 1e-9));
    }
}
