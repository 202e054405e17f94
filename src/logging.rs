//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Environment;

/// Filter used when `RUST_LOG` is unset. Request spans from `tower_http`
/// are only interesting outside production.
fn default_directives(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => "b2b_marketplace_backend=debug,tower_http=debug,sqlx=warn,info",
        Environment::Staging => "b2b_marketplace_backend=debug,tower_http=info,sqlx=warn,info",
        Environment::Prod => "b2b_marketplace_backend=info,sqlx=warn,warn",
    }
}

/// Pretty output in dev and staging, one JSON object per line in prod.
pub fn init_logging(env: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    let registry = tracing_subscriber::registry().with(filter);
    if env.is_prod() {
        registry.with(fmt_layer.json().flatten_event(true)).init();
    } else {
        registry.with(fmt_layer.pretty()).init();
    }

    tracing::debug!(env = ?env, "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            assert!(EnvFilter::try_new(default_directives(&env)).is_ok());
        }
        assert!(default_directives(&Environment::Prod).contains("b2b_marketplace_backend=info"));
    }
}
