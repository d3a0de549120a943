use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for a service binary.
///
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// structured JSON lines.
pub fn init(service_name: &str) -> Result<()> {
    // Default: info for our crates, warn-ish noise from dependencies stays at info.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,wab=info,wab_core=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    let installed = if json {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(true)
            .compact()
            .try_init()
    };
    installed.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))?;

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));

    Ok(())
}
