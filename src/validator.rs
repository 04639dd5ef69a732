use std::collections::{BTreeMap, HashSet};

/// Field-scoped validation errors, keyed by field name
pub type FieldErrors = BTreeMap<String, String>;

/// Accumulates field errors while checking request input
///
/// Only the first error recorded for a field is kept, so callers can run
/// checks from most to least specific without overwriting the message.
#[derive(Debug, Default, Clone)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no errors have been recorded
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record `message` for `key` unless the field already has an error
    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` for `key` when `ok` is false
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }
}

/// True if `value` appears in `permitted`
pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

/// True if every string in `values` is distinct
pub fn unique<S: AsRef<str>>(values: &[S]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_records_failed_condition() {
        let mut v = Validator::new();
        v.check(true, "title", "must be provided");
        assert!(v.valid());

        v.check(false, "title", "must be provided");
        assert!(!v.valid());
        assert_eq!(v.errors().get("title").map(String::as_str), Some("must be provided"));
    }

    #[test]
    fn test_first_error_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "year", "must be provided");
        v.check(false, "year", "must be greater than 1888");
        v.add_error("year", "must not be in the future");

        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()["year"], "must be provided");
    }

    #[test]
    fn test_unique() {
        assert!(unique(&["drama", "romance", "war"]));
        assert!(!unique(&["drama", "war", "drama"]));
        assert!(unique::<&str>(&[]));
    }

    #[test]
    fn test_permitted_value() {
        let safelist = ["id", "-id"];
        assert!(permitted_value(&"-id", &safelist));
        assert!(!permitted_value(&"title", &safelist));
    }
}
