pub mod config;
pub mod models;
pub mod service;
pub mod session;

pub use config::ServiceConfig;
pub use service::{AppState, create_app};
pub use session::{FileSessionStore, InMemorySessionStore, SessionRecord, SessionStore};

/// Initialize tracing from `RUST_LOG` and `LOG_FORMAT` (`pretty` or JSON).
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "medicai_service=info,medicai_core=info,tower_http=info".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}
