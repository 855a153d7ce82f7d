/// Display-name abbreviation for synthesised tools.
///
/// MCP tool names must match `^[a-z0-9_-]+$` and stay within 64 characters.
/// OpenAPI `operationId`s routinely blow past that
/// (`UserManagementControllerUpdateUserConfiguration…`), so we shorten them
/// in stages, stopping as soon as the result fits. The final stage truncates
/// and appends a digest suffix, which keeps names stable across runs:
/// identical inputs always produce identical names.
use sha2::{Digest, Sha256};

/// MCP tool-name length limit.
pub const MAX_NAME_LEN: usize = 64;

/// Truncation point leaving room for `-` plus a 4-hex-char digest suffix.
const TRUNCATE_AT: usize = 59;

/// Tokens dropped entirely before abbreviation.
const FILLER: &[&str] = &[
    "controller",
    "api",
    "service",
    "method",
    "the",
    "and",
    "for",
    "with",
];

/// Fixed abbreviation dictionary. Applied token-by-token.
const DICTIONARY: &[(&str, &str)] = &[
    ("management", "mgmt"),
    ("user", "usr"),
    ("users", "usrs"),
    ("service", "svc"),
    ("resource", "resrc"),
    ("resources", "resrcs"),
    ("update", "upd"),
    ("configuration", "config"),
    ("authority", "auth"),
    ("authorization", "auth"),
    ("list", "lst"),
    ("delete", "del"),
    ("description", "desc"),
    ("information", "info"),
    ("organization", "org"),
    ("repository", "repo"),
    ("application", "app"),
    ("attribute", "attr"),
    ("parameter", "param"),
    ("request", "req"),
    ("response", "resp"),
    ("document", "doc"),
    ("version", "ver"),
];

/// Derive a display name from an operationId (or the synthesised
/// `METHOD-path` fallback), abbreviating until it fits.
pub fn abbreviate(raw: &str) -> String {
    let tokens = tokenize(raw);
    let over_limit = raw.len() > MAX_NAME_LEN;

    let candidate = normalize(&tokens.join("-"));
    if !candidate.is_empty() && candidate.len() <= MAX_NAME_LEN && !over_limit {
        return candidate;
    }

    let tokens: Vec<String> = tokens
        .into_iter()
        .filter(|t| !FILLER.contains(&t.as_str()))
        .collect();
    if tokens.is_empty() {
        return fallback_name(raw);
    }
    let candidate = normalize(&tokens.join("-"));
    if !candidate.is_empty() && candidate.len() <= MAX_NAME_LEN && !over_limit {
        return candidate;
    }

    let tokens: Vec<String> = tokens.into_iter().map(|t| apply_dictionary(&t)).collect();
    let candidate = normalize(&tokens.join("-"));
    if !candidate.is_empty() && candidate.len() <= MAX_NAME_LEN && !over_limit {
        return candidate;
    }

    let tokens: Vec<String> = tokens.into_iter().map(|t| strip_vowels(&t)).collect();
    let candidate = normalize(&tokens.join("-"));
    if !candidate.is_empty() && candidate.len() <= MAX_NAME_LEN && !over_limit {
        return candidate;
    }

    if candidate.is_empty() {
        return fallback_name(raw);
    }

    // Truncate and pin the name to the original input with a digest suffix
    let truncated: String = candidate.chars().take(TRUNCATE_AT).collect();
    normalize(&format!("{}-{}", truncated, &digest_hex(raw)[..4]))
}

/// The no-abbreviation path: tokenisation and final validation only.
///
/// Used when the synthesiser is configured with abbreviation disabled; a
/// name that still violates the length or charset constraint is an error
/// rather than something we silently rewrite.
pub fn sanitize_only(raw: &str) -> Result<String, String> {
    let name = normalize(&tokenize(raw).join("-"));
    if name.is_empty() {
        return Err(format!("'{}' sanitises to an empty tool name", raw));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!(
            "tool name '{}' is {} chars, exceeding the {}-char limit (abbreviation is disabled)",
            name,
            name.len(),
            MAX_NAME_LEN
        ));
    }
    Ok(name)
}

/// Split an identifier into lowercase tokens on camel-case boundaries,
/// digit boundaries, underscores, hyphens, and any other non-alphanumeric
/// character.
fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in raw.chars() {
        let boundary = match (prev, c) {
            (Some(p), c) if c.is_ascii_uppercase() && p.is_ascii_lowercase() => true,
            (Some(p), c) if c.is_ascii_digit() != p.is_ascii_digit() => true,
            _ => false,
        };
        if boundary && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
            prev = Some(c);
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev = None;
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn apply_dictionary(token: &str) -> String {
    for (long, short) in DICTIONARY {
        if token == *long {
            return (*short).to_string();
        }
    }
    token.to_string()
}

/// Remove interior vowels from tokens longer than 4 chars, keeping the
/// first and last character intact.
fn strip_vowels(token: &str) -> String {
    if token.chars().count() <= 4 {
        return token.to_string();
    }
    let chars: Vec<char> = token.chars().collect();
    let last = chars.len() - 1;
    chars
        .iter()
        .enumerate()
        .filter(|(i, c)| *i == 0 || *i == last || !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
        .map(|(_, c)| c)
        .collect()
}

/// Collapse hyphen runs and strip leading/trailing hyphens.
fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // swallows leading hyphens
    for c in name.chars() {
        if c == '-' {
            if !last_was_hyphen {
                out.push('-');
                last_was_hyphen = true;
            }
        } else {
            out.push(c);
            last_was_hyphen = false;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

fn fallback_name(raw: &str) -> String {
    format!("tool-{}", &digest_hex(raw)[..8])
}

fn digest_hex(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
