//! Localized message catalog
//!
//! Messages are looked up by key and may contain `%@` placeholders that are replaced, in order,
//! by the supplied arguments. The built-in catalog is English; hosts can install translations
//! with [`install`].

use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::sync::RwLock;

const ENGLISH: &[(&str, &str)] = &[
    ("formula.syntax.found", "Syntax error: '%@'"),
    ("formula.syntax.end", "Syntax error: the formula is incomplete"),
    ("formula.syntax.depth", "Syntax error: the formula is nested too deeply"),
    ("formula.syntax.operator", "Unknown operator: '%@'"),
    ("formula.script.invalid", "Invalid generated code at offset %@: %@"),
];

static CATALOG: Lazy<RwLock<AHashMap<String, String>>> = Lazy::new(|| {
    RwLock::new(
        ENGLISH
            .iter()
            .map(|(key, text)| (key.to_string(), text.to_string()))
            .collect(),
    )
});

/// Replace (or add) the text for a message key
pub fn install<K: Into<String>, T: Into<String>>(key: K, text: T) {
    let mut catalog = CATALOG.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    catalog.insert(key.into(), text.into());
}

/// Look up a message and substitute its `%@` placeholders.
///
/// Unknown keys translate to the key itself.
pub fn translate(key: &str, args: &[&str]) -> String {
    let catalog = CATALOG.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    let template = catalog.get(key).map(String::as_str).unwrap_or(key);

    let mut result = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("%@") {
        result.push_str(&rest[..pos]);
        result.push_str(args.next().copied().unwrap_or(""));
        rest = &rest[pos + 2..];
    }
    result.push_str(rest);
    result
}
