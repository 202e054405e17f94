//! Service layer: persistence helpers shared by routes and clients for
//! external systems (Redis, Stripe).

pub mod billing;
pub mod cache;
pub mod listings;
pub mod notifications;
pub mod orders;
pub mod profiles;
pub mod ratings;
pub mod reports;
pub mod slugs;
pub mod stripe;
pub mod webhooks;

pub use cache::RedisCache;
pub use stripe::StripeClient;
