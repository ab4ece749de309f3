//! Secret scrubbing for log lines, error strings and serialized values.
//!
//! Two mechanisms, applied together:
//! - **Key-name match**: JSON object keys listed in [`SENSITIVE_KEYS`] have
//!   their values replaced wholesale.
//! - **Pattern match**: secret-shaped substrings (tokens, webhook URLs,
//!   stored ciphertexts, raw keys) are replaced inside any string.
//!
//! Values known at startup (the configured sink URL, the encryption key) are
//! registered as literals so they are scrubbed even when they match no
//! pattern.

use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Object keys whose values are always replaced (compared lowercase).
pub const SENSITIVE_KEYS: &[&str] = &[
    "secret",
    "token",
    "access_token",
    "refresh_token",
    "password",
    "authorization",
    "api_key",
    "encrypted_secret",
    "encryptedsecret",
    "encryption_key",
    "sink_url",
    "webhook_url",
    "x-figma-token",
];

struct SecretPattern {
    regex: &'static Lazy<Regex>,
    replacement: &'static str,
}

static WEBHOOK_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:hooks\.slack\.com|(?:[a-z0-9-]+\.)?discord(?:app)?\.com/api/webhooks)/\S+")
        .unwrap()
});

static CIPHERTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9a-f]{32}:[0-9a-f]{32}:[0-9a-f]*").unwrap());

static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*").unwrap());

static PERSONAL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfig[a-z]_[A-Za-z0-9_\-]{16,}").unwrap());

static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(sk-[a-zA-Z0-9_\-\.]{20,})\b").unwrap());

static HEX_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{64}\b").unwrap());

static QUERY_SECRET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(token|secret|password|api_key|access_token)=([^&\s]+)").unwrap()
});

const SECRET_PATTERNS: &[SecretPattern] = &[
    SecretPattern {
        regex: &WEBHOOK_URL_RE,
        replacement: "[REDACTED_WEBHOOK]",
    },
    SecretPattern {
        regex: &CIPHERTEXT_RE,
        replacement: "[REDACTED_CIPHERTEXT]",
    },
    SecretPattern {
        regex: &BEARER_RE,
        replacement: "Bearer [REDACTED]",
    },
    SecretPattern {
        regex: &PERSONAL_TOKEN_RE,
        replacement: "[REDACTED_TOKEN]",
    },
    SecretPattern {
        regex: &API_KEY_RE,
        replacement: "[REDACTED_API_KEY]",
    },
    SecretPattern {
        regex: &HEX_KEY_RE,
        replacement: "[REDACTED_KEY]",
    },
    SecretPattern {
        regex: &QUERY_SECRET_RE,
        replacement: "$1=[REDACTED]",
    },
];

static LITERALS: Lazy<RwLock<Vec<String>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Register a value that must never be emitted verbatim.
///
/// Very short values are ignored; scrubbing them would mangle ordinary text.
pub fn register_literal(value: &str) {
    let value = value.trim();
    if value.len() < 8 {
        return;
    }
    if let Ok(mut literals) = LITERALS.write() {
        if !literals.iter().any(|l| l == value) {
            literals.push(value.to_string());
            // longest first so a registered URL wins over its own prefix
            literals.sort_by_key(|l| std::cmp::Reverse(l.len()));
        }
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
}

/// Scrub secret-shaped substrings and registered literals from `text`.
pub fn redact_text(text: &str) -> String {
    let mut out = text.to_string();

    if let Ok(literals) = LITERALS.read() {
        for literal in literals.iter() {
            if out.contains(literal.as_str()) {
                out = out.replace(literal.as_str(), REDACTED);
            }
        }
    }

    for pattern in SECRET_PATTERNS {
        let re: &Regex = pattern.regex;
        if re.is_match(&out) {
            out = re.replace_all(&out, pattern.replacement).into_owned();
        }
    }

    out
}

/// Recursively redact a JSON value in place: sensitive keys are blanked,
/// every other string is pattern-scrubbed.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            let scrubbed = redact_text(s);
            if scrubbed != *s {
                *s = scrubbed;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if is_sensitive_key(key) && !v.is_null() {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact_value(v);
                }
            }
        }
        _ => {}
    }
}

/// Serialize `value` to a redacted JSON value.
pub fn redacted<T: serde::Serialize>(value: &T) -> Value {
    let mut v = serde_json::to_value(value).unwrap_or(Value::Null);
    redact_value(&mut v);
    v
}
