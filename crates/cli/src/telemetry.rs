use std::sync::OnceLock;

use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, layer::SubscriberExt as _};

static TELEMETRY_INIT: OnceLock<()> = OnceLock::new();

/// Logs go to stderr so the report on stdout stays clean.
pub fn get_subscriber() -> impl Subscriber + Send + Sync {
    // RUST_LOG wins, warnings only otherwise
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
        .add_directive("h2=warn".parse().expect("well-formed"))
        .add_directive("hyper_util=warn".parse().expect("well-formed"))
        .add_directive("reqwest=warn".parse().expect("well-formed"))
        .add_directive("alloy_transport_http=warn".parse().expect("well-formed"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::Registry::default()
        .with(filter)
        .with(fmt_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    TELEMETRY_INIT
        .set(())
        .expect("global tracing subscriber already set");
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
