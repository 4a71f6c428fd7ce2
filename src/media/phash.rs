// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Perceptual hashing for the second-stage image dedup.
//!
//! Hashes are 64-bit gradient hashes stored base64-encoded; two images
//! within the configured Hamming distance are flagged as perceptual
//! duplicates without deleting either file.

use img_hash::{HashAlg, HasherConfig, ImageHash};

/// Compute the perceptual hash of encoded image bytes. Non-decodable bytes
/// yield `None`.
pub fn compute(bytes: &[u8]) -> Option<String> {
    let img = image::load_from_memory(bytes).ok()?;
    let hasher = HasherConfig::new()
        .hash_size(8, 8)
        .hash_alg(HashAlg::Gradient)
        .to_hasher();
    Some(hasher.hash_image(&img).to_base64())
}

/// Hamming distance between two stored hashes. `None` when either does not
/// parse (e.g. rows written by older builds).
pub fn distance(a: &str, b: &str) -> Option<u32> {
    let ha = ImageHash::<Box<[u8]>>::from_base64(a).ok()?;
    let hb = ImageHash::<Box<[u8]>>::from_base64(b).ok()?;
    Some(ha.dist(&hb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_png(rgb: [u8; 3], size: u32) -> Vec<u8> {
        let mut img = image::RgbImage::new(size, size);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb(rgb);
        }
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Png)
            .expect("encode png");
        buf
    }

    fn gradient_png(size: u32) -> Vec<u8> {
        let mut img = image::RgbImage::new(size, size);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 255 / size) as u8, (y * 255 / size) as u8, 0]);
        }
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let a = compute(&solid_png([10, 20, 30], 32)).unwrap();
        let b = compute(&solid_png([10, 20, 30], 32)).unwrap();
        assert_eq!(distance(&a, &b), Some(0));
    }

    #[test]
    fn resized_image_stays_within_threshold() {
        let a = compute(&gradient_png(64)).unwrap();
        let b = compute(&gradient_png(32)).unwrap();
        assert!(distance(&a, &b).unwrap() <= 5);
    }

    #[test]
    fn unparseable_hash_yields_none() {
        let a = compute(&solid_png([1, 2, 3], 16)).unwrap();
        assert_eq!(distance(&a, "not-base64!!"), None);
    }

    #[test]
    fn non_image_bytes_yield_none() {
        assert!(compute(b"plain text").is_none());
    }
}
