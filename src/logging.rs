//! Tracing setup: pretty output locally, JSON lines in production

use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Outbound HTTP internals stay quiet;
/// gateway calls are logged by the Razorpay client itself.
fn default_filter(env: &Environment) -> &'static str {
    match env {
        Environment::Dev => {
            "zomatify_backend=debug,tower_http=debug,sqlx=warn,hyper=warn,reqwest=warn,info"
        }
        Environment::Staging => {
            "zomatify_backend=debug,tower_http=info,sqlx=warn,hyper=warn,reqwest=warn,info"
        }
        Environment::Prod => "zomatify_backend=info,tower_http=info,sqlx=error,warn",
    }
}

pub fn init_logging(env: &Environment) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    if env.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .init();
    }

    tracing::info!(env = ?env, "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_parse() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            assert!(EnvFilter::try_new(default_filter(&env)).is_ok());
        }
    }

    #[test]
    fn prod_keeps_crate_at_info() {
        assert!(default_filter(&Environment::Prod).starts_with("zomatify_backend=info"));
    }
}
