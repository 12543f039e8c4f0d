use crate::config::AppConfig;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

/// Initialize the global JSON subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the configured level
/// applies to this crate while HTTP internals are capped at `warn` so
/// per-request chatter from the client stack stays out of the stream.
pub fn init_subscriber(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,reqwest=warn,tower_http=warn",
            config.log_level
        ))
    });

    let formatter = fmt::layer().json();

    let subscriber = Registry::default().with(filter).with(formatter);

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");
}
