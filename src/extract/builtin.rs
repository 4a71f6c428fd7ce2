// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Builtin detector patterns seeded into the registry at startup.

pub const EMAIL_STANDARD: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";
pub const EMAIL_OBFUSCATED: &str = r"[a-zA-Z0-9._%+-]+\s*[\[\(\{]?\s*(?:@|at|arroba|AT)\s*[\]\)\}]?\s*[a-zA-Z0-9.-]+\s*[\[\(\{]?\s*(?:\.|dot|punto|DOT)\s*[\]\)\}]?\s*[a-zA-Z]{2,}";
pub const PHONE_INTERNATIONAL: &str = r"\+[1-9]\d{6,14}";
pub const PHONE_INTERNATIONAL_SPACED: &str = r"\+[1-9][\d\s\-\.]{7,18}\d";
pub const BITCOIN_LEGACY: &str = r"\b[13][a-km-zA-HJ-NP-Z1-9]{25,34}\b";
pub const BITCOIN_BECH32: &str = r"\bbc1[a-zA-HJ-NP-Z0-9]{39,59}\b";
pub const ETHEREUM: &str = r"\b0x[a-fA-F0-9]{40}\b";
pub const TRON: &str = r"\bT[a-zA-HJ-NP-Z1-9]{33}\b";
pub const TELEGRAM_USERNAME: &str = r"@[a-zA-Z][a-zA-Z0-9_]{4,31}";
pub const TELEGRAM_INVITE_PLUS: &str = r"(?:https?://)?t\.me/\+[a-zA-Z0-9_-]+";
pub const TELEGRAM_JOINCHAT: &str = r"(?:https?://)?(?:t\.me|telegram\.me)/joinchat/[a-zA-Z0-9_-]+";
pub const TELEGRAM_LINK: &str = r"(?:https?://)?t\.me/[a-zA-Z0-9_]+(?:/\d+)?";
pub const TELEGRAM_DEEP_LINK: &str = r"tg://(?:resolve\?domain=|user\?id=|openmessage\?user_id=|join\?invite=|privatepost\?)[a-zA-Z0-9_=&]+";
pub const URL_ABSOLUTE: &str = r#"https?://[^\s<>"'\]\)]+"#;

/// (name, pattern, category, description, priority)
pub const BUILTIN_DETECTORS: &[(&str, &str, &str, &str, i32)] = &[
    (
        "Email Standard",
        EMAIL_STANDARD,
        "email",
        "Standard email addresses",
        5,
    ),
    (
        "Email Obfuscated At",
        EMAIL_OBFUSCATED,
        "email",
        "Obfuscated emails (user [at] domain [dot] com)",
        4,
    ),
    (
        "Phone International",
        PHONE_INTERNATIONAL,
        "phone",
        "International phone numbers with + prefix",
        5,
    ),
    (
        "Phone International Spaced",
        PHONE_INTERNATIONAL_SPACED,
        "phone",
        "International phones with spaces/dashes",
        5,
    ),
    (
        "Bitcoin Legacy",
        BITCOIN_LEGACY,
        "crypto",
        "Bitcoin legacy addresses (1... or 3...)",
        5,
    ),
    (
        "Bitcoin Bech32",
        BITCOIN_BECH32,
        "crypto",
        "Bitcoin bech32 addresses (bc1...)",
        5,
    ),
    ("Ethereum", ETHEREUM, "crypto", "Ethereum addresses", 5),
    ("USDT TRC20", TRON, "crypto", "USDT TRC20 (TRON) addresses", 5),
    (
        "Telegram Invite Plus",
        TELEGRAM_INVITE_PLUS,
        "invite_link",
        "t.me/+ invite links",
        6,
    ),
    (
        "Telegram Joinchat",
        TELEGRAM_JOINCHAT,
        "invite_link",
        "t.me/joinchat invite links",
        6,
    ),
    (
        "Telegram Link",
        TELEGRAM_LINK,
        "telegram_link",
        "t.me public links",
        4,
    ),
    (
        "Telegram Deep Link",
        TELEGRAM_DEEP_LINK,
        "telegram_link",
        "tg:// deep links",
        4,
    ),
    (
        "Telegram Username",
        TELEGRAM_USERNAME,
        "telegram_username",
        "@username mentions",
        3,
    ),
    (
        "URL Absolute",
        URL_ABSOLUTE,
        "url",
        "Absolute http(s) URLs",
        2,
    ),
];
