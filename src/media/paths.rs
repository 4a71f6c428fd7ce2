// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed media layout:
//! `<root>/<yy>/<mm>/<hh2>/<sha256_hex>.<ext>` where `hh2` is the first two
//! hex characters of the hash. Files land in a temp directory first and move
//! into place with an atomic rename.

use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};

/// Extension derived from the original file name, falling back to mime.
pub fn extension(file_name: Option<&str>, mime_type: Option<&str>) -> String {
    if let Some(name) = file_name {
        if let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) {
            if !ext.is_empty() && ext.len() <= 8 {
                return ext.to_lowercase();
            }
        }
    }
    match mime_type.unwrap_or("") {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "application/pdf" => "pdf",
        _ => "bin",
    }
    .to_string()
}

/// Final content-addressed path for a hash stored now.
pub fn final_path(root: &Path, sha256_hex: &str, ext: &str) -> PathBuf {
    let now = Utc::now();
    let shard = &sha256_hex[..2.min(sha256_hex.len())];
    root.join(format!("{:02}", now.year() % 100))
        .join(format!("{:02}", now.month()))
        .join(shard)
        .join(format!("{}.{}", sha256_hex, ext))
}

/// Scratch path for an in-flight download; same filesystem as the root so
/// the final rename is atomic.
pub fn temp_path(root: &Path, sha256_hex: &str) -> PathBuf {
    root.join("tmp").join(format!("{}.part", sha256_hex))
}

/// Store a small blob (profile photo, story) content-addressed under the
/// media root. Returns the final path; an already stored identical blob is
/// reused without rewriting.
pub async fn store_content_addressed(
    root: &Path,
    bytes: &[u8],
    file_name: Option<&str>,
    mime_type: Option<&str>,
) -> std::io::Result<PathBuf> {
    use sha2::{Digest, Sha256};

    let hash = hex::encode(Sha256::digest(bytes));
    let ext = extension(file_name, mime_type);
    let path = final_path(root, &hash, &ext);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(path);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp = temp_path(root, &hash);
    if let Some(parent) = temp.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&temp, bytes).await?;
    tokio::fs::rename(&temp, &path).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_file_name() {
        assert_eq!(extension(Some("video.MP4"), Some("image/jpeg")), "mp4");
        assert_eq!(extension(None, Some("image/jpeg")), "jpg");
        assert_eq!(extension(None, None), "bin");
        assert_eq!(extension(Some("noext"), Some("image/png")), "png");
    }

    #[test]
    fn final_path_is_sharded_by_hash_prefix() {
        let hash = "ab".repeat(32);
        let path = final_path(Path::new("/media"), &hash, "jpg");
        let s = path.to_string_lossy();
        assert!(s.starts_with("/media/"));
        assert!(s.contains("/ab/"));
        assert!(s.ends_with(&format!("{}.jpg", hash)));
    }
}
