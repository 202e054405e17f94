pub mod actor;
pub mod claims;
pub mod context;
pub mod jwks;
pub mod middleware;

pub use actor::{CurrentUser, MaybeUser, RequireStaff};
pub use claims::Claims;
pub use context::AuthContext;
pub use jwks::JwksCache;
pub use middleware::RequireAuth;
