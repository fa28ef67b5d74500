//! Internationalization (i18n) module.
//!
//! User-facing texts live in embedded JSON tables, one per locale, and are
//! addressed by dotted keys such as `dispatch.not_found`. Unknown locales
//! fall back to English; unknown keys render as the key itself.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_LOCALE: &str = "en";

/// LangCode -> parsed table.
static TRANSLATIONS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (lang, raw) in [("en", include_str!("en.json")), ("id", include_str!("id.json"))] {
        match serde_json::from_str(raw) {
            Ok(table) => {
                map.insert(lang, table);
            }
            Err(e) => warn!("Translation table {} is invalid: {}", lang, e),
        }
    }
    map
});

pub fn is_supported(lang: &str) -> bool {
    TRANSLATIONS.contains_key(lang)
}

/// Get text for a key in a specific language.
pub fn get_text(lang: &str, key: &str) -> String {
    TRANSLATIONS
        .get(lang)
        .and_then(|table| resolve_key(table, key))
        .or_else(|| {
            TRANSLATIONS
                .get(DEFAULT_LOCALE)
                .and_then(|table| resolve_key(table, key))
        })
        .unwrap_or_else(|| key.to_string())
}

/// [`get_text`] with `{name}` placeholders replaced.
pub fn format_text(lang: &str, key: &str, args: &[(&str, &str)]) -> String {
    fill(&get_text(lang, key), args)
}

/// Replace `{name}` placeholders in one pass over `template`.
///
/// Substituted values are never scanned again, and placeholders without
/// a matching arg are left as written.
pub fn fill(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rest = &rest[open..];
            break;
        };
        let name = &after[..close];
        match args.iter().find(|(arg, _)| *arg == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

fn resolve_key(table: &Value, key: &str) -> Option<String> {
    key.split('.')
        .try_fold(table, |node, part| node.get(part))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keys_and_fallbacks() {
        assert!(get_text("en", "dispatch.permission_denied").contains("permission"));
        assert_eq!(get_text("xx", "dispatch.failed"), get_text("en", "dispatch.failed"));
        assert_eq!(get_text("en", "no.such.key"), "no.such.key");
    }

    #[test]
    fn placeholders_are_filled() {
        let text = format_text("en", "dispatch.not_found", &[("command", "frob"), ("prefix", "?")]);
        assert!(text.contains("\"frob\""));
        assert!(text.contains("?help"));
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let text = format_text(
            "en",
            "dispatch.not_found",
            &[("command", "{prefix}"), ("prefix", "!")],
        );
        assert!(text.contains("\"{prefix}\""), "{text}");
        assert!(text.contains("!help"), "{text}");
    }

    #[test]
    fn fill_keeps_unknown_and_unclosed_braces() {
        assert_eq!(fill("{a} {b} {", &[("a", "x")]), "x {b} {");
        assert_eq!(fill("{a}{a}", &[("a", "{a}")]), "{a}{a}");
        assert_eq!(fill("no placeholders", &[]), "no placeholders");
    }

    #[test]
    fn every_locale_has_the_dispatch_texts() {
        for lang in ["en", "id"] {
            assert!(is_supported(lang));
            for key in ["usage_hint", "not_found", "permission_denied", "cooldown", "failed"] {
                let key = format!("dispatch.{key}");
                assert_ne!(get_text(lang, &key), key, "{lang} is missing {key}");
            }
        }
    }
}
