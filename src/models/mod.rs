pub mod filters;
pub mod movies;
pub mod permissions;
pub mod tokens;
pub mod users;

pub use filters::{Filters, Metadata, SortColumn, SortDirection, SortOrder};
pub use movies::{Movie, Runtime};
pub use permissions::Permissions;
pub use tokens::{Scope, Token};
pub use users::{CurrentUser, User};
