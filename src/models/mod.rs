use std::sync::OnceLock;

use regex::Regex;

pub mod _entities;

pub use _entities::prelude::*;

/// Currency codes are 3-5 uppercase ASCII letters (ISO 4217 plus the longer
/// unofficial codes some providers list).
pub fn is_currency_code(code: &str) -> bool {
    static CODE_RE: OnceLock<Regex> = OnceLock::new();
    let re = CODE_RE.get_or_init(|| Regex::new(r"^[A-Z]{3,5}$").expect("valid regex"));
    re.is_match(code)
}
