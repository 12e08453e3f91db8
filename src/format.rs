//! Named string format checks (`format` keyword).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use uuid::Uuid;

/// A caller-supplied format check.
pub type FormatCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Format checks keyed by format name.
///
/// Overrides registered by the caller are consulted first, then the
/// built-ins (`email`, `uri`/`url`, `uuid`, `date`, `date-time`).
/// Unknown format names accept every string.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    overrides: HashMap<String, FormatCheck>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check for `name`, replacing any built-in of that name.
    pub fn with_override<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.overrides.insert(name.into(), Arc::new(check));
        self
    }

    /// Run the check registered for `name` against `input`.
    pub fn check(&self, name: &str, input: &str) -> bool {
        if let Some(check) = self.overrides.get(name) {
            return check(input);
        }
        match builtin(name) {
            Some(check) => check(input),
            None => {
                tracing::trace!(format = name, "unknown format, accepting");
                true
            }
        }
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.overrides.keys().collect();
        names.sort();
        f.debug_struct("FormatRegistry")
            .field("overrides", &names)
            .finish()
    }
}

fn builtin(name: &str) -> Option<fn(&str) -> bool> {
    match name {
        "email" => Some(is_email),
        "uri" | "url" => Some(is_uri),
        "uuid" => Some(is_uuid),
        "date" => Some(is_date),
        "date-time" => Some(is_date_time),
        _ => None,
    }
}

pub fn is_email(s: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .map_or(false, |re| re.is_match(s))
}

/// Absolute URI with a scheme.
pub fn is_uri(s: &str) -> bool {
    url::Url::parse(s).is_ok()
}

/// Hyphenated 8-4-4-4-12 form only.
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::parse_str(s).is_ok()
}

/// Full date, `YYYY-MM-DD`.
pub fn is_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// RFC 3339 date-time.
pub fn is_date_time(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
}
