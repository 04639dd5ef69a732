/// Lifetime of an account activation token in hours (3 days)
pub const ACTIVATION_TOKEN_TTL_HOURS: i64 = 72;

/// Lifetime of an authentication token in hours
pub const AUTHENTICATION_TOKEN_TTL_HOURS: i64 = 24;

/// Maximum accepted JSON request body (1MB)
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Default page size for listings
pub const DEFAULT_PAGE_SIZE: i64 = 20;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for an activation token that is unknown, used or expired
pub const ERR_INVALID_ACTIVATION_TOKEN: &str = "invalid or expired activation token";

/// Error message for non-numeric query parameters
pub const ERR_NOT_AN_INTEGER: &str = "must be an integer value";
