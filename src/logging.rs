// logging.rs — one-time env_logger setup for the viewer binary and tests

use std::sync::Once;

/// wgpu is chatty at info level; keep it to warnings unless asked.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// `filter` uses the `env_logger` syntax, e.g. "debug" or
/// "photosphere=trace,wgpu_core=warn".
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }
}

/// Explicit filter first, then `RUST_LOG`, then `DEFAULT_FILTER`.
pub fn resolve_filter<'a>(explicit: Option<&'a str>, env: Option<&'a str>) -> String {
    let given = |f: Option<&'a str>| f.map(str::trim).filter(|f| !f.is_empty());
    given(explicit)
        .or_else(|| given(env))
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let env = std::env::var("RUST_LOG").ok();
        let filter = resolve_filter(config.filter.as_deref(), env.as_deref());

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter);
        builder.write_style(config.write_style);
        // a test harness or embedding host may already own the logger
        if builder.try_init().is_err() {
            return;
        }
        log::debug!("logging initialized ({filter})");
    });
}
