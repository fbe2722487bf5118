use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "MARKSYD_LOG";
const DEFAULT_LOG_DIRECTIVES: &str = "info";

/// Logs go to stderr; stdout carries protocol responses only.
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES))
        .map_err(|e| anyhow::anyhow!("invalid log directives: {e}"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("logger already initialized: {e}"))?;
    Ok(())
}
