use serde::Serialize;

/// Permission to list and read movies
pub const MOVIES_READ: &str = "movies:read";

/// Permission to create, update and delete movies
pub const MOVIES_WRITE: &str = "movies:write";

/// The set of permission codes a user holds
///
/// Loaded fresh for every authorization check, never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: Vec<String>) -> Self {
        Self(codes)
    }

    /// True if `code` is part of the set
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include() {
        let permissions = Permissions::new(vec![MOVIES_READ.to_string()]);

        assert!(permissions.include(MOVIES_READ));
        assert!(!permissions.include(MOVIES_WRITE));
        assert!(!Permissions::default().include(MOVIES_READ));
    }
}
