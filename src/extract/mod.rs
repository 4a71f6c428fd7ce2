// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Regex detector engine applied to message text.
//!
//! Detectors live in the database; compiled patterns are cached in a bounded
//! LRU keyed by detector id. A scan runs every active detector in priority
//! order, dedupes matches within the scan, extracts surrounding context, and
//! normalizes the matched value per category.

pub mod builtin;

use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::config::DetectionConfig;
use crate::models::detection::Detector;

/// Characters of context kept on each side of a match.
const CONTEXT_CHARS: usize = 50;

/// A single match produced by a scan, not yet tied to a message row.
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    pub detector_id: i32,
    pub detector_name: String,
    pub detection_type: String,
    pub matched_text: String,
    pub normalized_value: String,
    pub context_before: String,
    pub context_after: String,
}

/// Shared extractor with a bounded compiled-pattern cache.
pub struct Extractor {
    cache: Mutex<LruCache<i32, (String, Arc<Regex>)>>,
    validate_patterns: bool,
}

impl Extractor {
    pub fn new(config: &DetectionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            validate_patterns: config.validate_patterns,
        }
    }

    /// Check that a pattern compiles; used before accepting user detectors.
    pub fn validate_pattern(pattern: &str) -> bool {
        !pattern.is_empty() && Regex::new(pattern).is_ok()
    }

    /// Compile (or fetch from cache) the pattern of a detector. Returns
    /// `None` for invalid patterns; other detectors are unaffected.
    fn compiled(&self, detector: &Detector) -> Option<Arc<Regex>> {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((pattern, regex)) = cache.get(&detector.id) {
            if *pattern == detector.pattern {
                return Some(regex.clone());
            }
        }

        if self.validate_patterns && !Self::validate_pattern(&detector.pattern) {
            warn!(
                detector = %detector.name,
                "Invalid detector pattern, skipping"
            );
            return None;
        }

        match RegexBuilder::new(&detector.pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
        {
            Ok(regex) => {
                let regex = Arc::new(regex);
                cache.put(detector.id, (detector.pattern.clone(), regex.clone()));
                Some(regex)
            }
            Err(e) => {
                warn!(
                    detector = %detector.name,
                    error = %e,
                    "Failed to compile detector pattern"
                );
                None
            }
        }
    }

    /// Run all detectors over a text. Detectors are expected to arrive in
    /// priority-descending order; duplicates within the scan are dropped by
    /// (category, lowercased match).
    pub fn scan(&self, detectors: &[Detector], text: &str) -> Vec<DetectionCandidate> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut seen: std::collections::HashSet<(String, String)> = std::collections::HashSet::new();
        let mut candidates = Vec::new();

        for detector in detectors.iter().filter(|d| d.is_active) {
            let regex = match self.compiled(detector) {
                Some(r) => r,
                None => continue,
            };

            for m in regex.find_iter(text) {
                let matched = m.as_str().to_string();
                let key = (detector.category.clone(), matched.to_lowercase());
                if !seen.insert(key) {
                    continue;
                }

                candidates.push(DetectionCandidate {
                    detector_id: detector.id,
                    detector_name: detector.name.clone(),
                    detection_type: detector.category.clone(),
                    normalized_value: normalize(&detector.category, &matched),
                    context_before: context_before(text, m.start()),
                    context_after: context_after(text, m.end()),
                    matched_text: matched,
                });
            }
        }

        candidates
    }
}

fn context_before(text: &str, start: usize) -> String {
    let chars: Vec<char> = text[..start].chars().collect();
    let from = chars.len().saturating_sub(CONTEXT_CHARS);
    chars[from..].iter().collect()
}

fn context_after(text: &str, end: usize) -> String {
    text[end..].chars().take(CONTEXT_CHARS).collect()
}

/// Canonicalize a matched value for storage and aggregation.
pub fn normalize(category: &str, matched: &str) -> String {
    let trimmed = matched.trim();
    match category {
        "email" => trimmed.to_lowercase(),
        "phone" => normalize_phone(trimmed),
        "crypto" => trimmed.chars().filter(|c| !c.is_whitespace()).collect(),
        "url" => normalize_url(trimmed),
        "invite_link" => normalize_invite(trimmed),
        "telegram_username" => trimmed.trim_start_matches('@').to_lowercase(),
        "telegram_link" => trimmed.to_lowercase(),
        _ => trimmed.to_lowercase(),
    }
}

/// Best-effort E.164: keep a leading `+`, drop every other non-digit.
fn normalize_phone(value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if value.starts_with('+') {
        format!("+{}", digits)
    } else {
        digits
    }
}

/// Lowercase scheme and host, keep path/query untouched.
fn normalize_url(value: &str) -> String {
    if let Some(idx) = value.find("://") {
        let after_scheme = idx + 3;
        let rest = &value[after_scheme..];
        let host_end = rest
            .find(|c| c == '/' || c == '?' || c == '#')
            .unwrap_or(rest.len());
        let mut out = value[..after_scheme + host_end].to_lowercase();
        out.push_str(&rest[host_end..]);
        out
    } else {
        let host_end = value
            .find(|c| c == '/' || c == '?' || c == '#')
            .unwrap_or(value.len());
        let mut out = value[..host_end].to_lowercase();
        out.push_str(&value[host_end..]);
        out
    }
}

/// The invite hash is the canonical identity of an invite link.
fn normalize_invite(value: &str) -> String {
    invite_hash(value).unwrap_or_else(|| value.trim().to_lowercase())
}

/// Extract the invite hash from any supported invite link shape.
pub fn invite_hash(link: &str) -> Option<String> {
    let link = link.trim();
    if let Some(rest) = link.split("t.me/+").nth(1) {
        let hash: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if !hash.is_empty() {
            return Some(hash);
        }
    }
    for marker in ["joinchat/", "join?invite="] {
        if let Some(rest) = link.split(marker).nth(1) {
            let hash: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .collect();
            if !hash.is_empty() {
                return Some(hash);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn detector(id: i32, name: &str, pattern: &str, category: &str, priority: i32) -> Detector {
        Detector {
            id,
            name: name.to_string(),
            pattern: pattern.to_string(),
            category: category.to_string(),
            description: None,
            priority,
            is_builtin: true,
            is_active: true,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn extractor() -> Extractor {
        Extractor::new(&crate::config::DetectionConfig {
            cache_size: 16,
            validate_patterns: true,
        })
    }

    #[test]
    fn scan_finds_email_and_phone() {
        let detectors = vec![
            detector(1, "Email Standard", builtin::EMAIL_STANDARD, "email", 5),
            detector(2, "Phone International", builtin::PHONE_INTERNATIONAL, "phone", 5),
        ];
        let text = "contact bob@example.com +14155550123";
        let found = extractor().scan(&detectors, text);

        assert_eq!(found.len(), 2);
        let email = found.iter().find(|c| c.detection_type == "email").unwrap();
        assert_eq!(email.normalized_value, "bob@example.com");
        let phone = found.iter().find(|c| c.detection_type == "phone").unwrap();
        assert_eq!(phone.normalized_value, "+14155550123");
    }

    #[test]
    fn scan_dedupes_repeated_matches_per_category() {
        let detectors = vec![detector(1, "Email Standard", builtin::EMAIL_STANDARD, "email", 5)];
        let found = extractor().scan(&detectors, "A@x.com a@X.com a@x.com");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn invalid_pattern_does_not_block_other_detectors() {
        let detectors = vec![
            detector(1, "Broken", "([unclosed", "email", 9),
            detector(2, "Email Standard", builtin::EMAIL_STANDARD, "email", 5),
        ];
        let found = extractor().scan(&detectors, "x bob@example.com");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].detector_id, 2);
    }

    #[test]
    fn context_respects_char_boundaries() {
        let detectors = vec![detector(1, "Email Standard", builtin::EMAIL_STANDARD, "email", 5)];
        let text = format!("{} bob@example.com {}", "ñ".repeat(80), "é".repeat(80));
        let found = extractor().scan(&detectors, &text);
        assert_eq!(found[0].context_before.chars().count(), 50);
        assert_eq!(found[0].context_after.chars().count(), 50);
    }

    #[test]
    fn normalizes_urls_and_invites() {
        assert_eq!(
            normalize("url", "HTTPS://EXAMPLE.COM/PaTh?Q=1"),
            "https://example.com/PaTh?Q=1"
        );
        assert_eq!(normalize("invite_link", "https://t.me/+AbCd_123"), "AbCd_123");
        assert_eq!(normalize("invite_link", "t.me/joinchat/XyZ-9"), "XyZ-9");
        assert_eq!(normalize("telegram_username", "@SomeUser"), "someuser");
    }

    #[test]
    fn scanning_same_text_twice_yields_identical_candidates() {
        let detectors = vec![detector(1, "Email Standard", builtin::EMAIL_STANDARD, "email", 5)];
        let ex = extractor();
        let a = ex.scan(&detectors, "write to bob@example.com now");
        let b = ex.scan(&detectors, "write to bob@example.com now");
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].matched_text, b[0].matched_text);
        assert_eq!(a[0].normalized_value, b[0].normalized_value);
    }
}
