// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Downloaded file validation: non-zero size, format probe, and decoded
//! dimensions for images.

use crate::models::media::file_type;

/// What validation learned about the bytes.
#[derive(Debug, Default)]
pub struct Probe {
    pub mime_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Magic-byte sniff of the container format.
fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 12 {
        return None;
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif")
    } else if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if &bytes[4..8] == b"ftyp" {
        Some("video/mp4")
    } else if bytes.starts_with(b"OggS") {
        Some("audio/ogg")
    } else if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        Some("video/webm")
    } else if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) {
        Some("audio/mpeg")
    } else {
        None
    }
}

fn is_image_kind(kind: &str) -> bool {
    kind == file_type::PHOTO || kind == file_type::STICKER
}

/// Validate downloaded bytes for a media kind. `Err` carries the verdict
/// reason; images must decode to non-zero dimensions.
pub fn validate(kind: &str, bytes: &[u8]) -> Result<Probe, String> {
    if bytes.is_empty() {
        return Err("empty file".to_string());
    }

    let mime_type = sniff(bytes).map(|m| m.to_string());

    if is_image_kind(kind) {
        match image::load_from_memory(bytes) {
            Ok(img) => {
                use image::GenericImageView;
                let (w, h) = img.dimensions();
                if w == 0 || h == 0 {
                    return Err("image has zero dimensions".to_string());
                }
                Ok(Probe {
                    mime_type,
                    width: Some(w as i32),
                    height: Some(h as i32),
                })
            }
            Err(e) => Err(format!("image decode failed: {}", e)),
        }
    } else {
        Ok(Probe {
            mime_type,
            width: None,
            height: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest valid PNG: 1x1 transparent pixel.
    pub fn tiny_png() -> Vec<u8> {
        let mut buf = Vec::new();
        let img = image::DynamicImage::new_rgba8(1, 1);
        img.write_to(&mut buf, image::ImageOutputFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn empty_bytes_are_invalid() {
        assert!(validate(file_type::PHOTO, &[]).is_err());
        assert!(validate(file_type::DOCUMENT, &[]).is_err());
    }

    #[test]
    fn valid_png_probes_dimensions() {
        let probe = validate(file_type::PHOTO, &tiny_png()).expect("valid");
        assert_eq!(probe.width, Some(1));
        assert_eq!(probe.height, Some(1));
        assert_eq!(probe.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn garbage_photo_bytes_are_invalid() {
        let garbage = vec![0x00; 64];
        assert!(validate(file_type::PHOTO, &garbage).is_err());
        // Non-image kinds only need a non-empty body.
        assert!(validate(file_type::DOCUMENT, &garbage).is_ok());
    }
}
