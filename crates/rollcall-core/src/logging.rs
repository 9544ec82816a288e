use crate::config;
use tracing_subscriber::EnvFilter;

/// Default directives: third-party crates stay at `info`, the rollcall
/// crates log at `debug`. `RUST_LOG` replaces the whole filter.
fn default_filter() -> EnvFilter {
    EnvFilter::new(
        "info,rollcall_core=debug,rollcall_attendance=debug,rollcall_sync=debug,rollcall_gateway=debug",
    )
}

/// Initializes the subscriber for one service process. JSON output is the
/// deployed default; `LOG_FORMAT=pretty` switches to human-readable output
/// for local runs. The `service` field rides on the request span (see
/// `http::apply_standard_layers`) so every request-scoped event carries it.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config::env_or("LOG_FORMAT", "json") == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().with_current_span(true).init();
    }

    tracing::info!(service = service_name, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_keeps_rollcall_crates_at_debug() {
        let filter = default_filter().to_string();
        assert!(filter.contains("rollcall_sync=debug"));
        assert!(filter.starts_with("info"));
    }
}
