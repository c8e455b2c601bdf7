use std::env::var;
use tracing::subscriber::set_global_default;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Compose multiple layers into a `tracing`'s subscriber.
///
/// Events are written to stderr, stdout being reserved for command output.
/// The returned guard must be kept alive for the file layer to flush.
pub fn init_subscriber(
    name: &str,
    env_filter: &str,
) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env_filter));

    let stderr = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_target(false);

    // Env variable LOG_CONFIG_PATH points at the path where
    // LOG_CONFIG_FILENAME is located
    let (file, guard) = match var("LOG_CONFIG_PATH") {
        Ok(log_config_path) => {
            // Env variable LOG_CONFIG_FILENAME names the log file
            let log_config_filename = var("LOG_CONFIG_FILENAME")
                .unwrap_or_else(|_| format!("{name}.log"));
            let file_appender = tracing_appender::rolling::never(
                log_config_path,
                log_config_filename,
            );
            let (non_blocking_file, guard) =
                tracing_appender::non_blocking(file_appender);
            let layer = fmt::Layer::default()
                .with_writer(non_blocking_file)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let subscriber =
        Registry::default().with(env_filter).with(stderr).with(file);
    set_global_default(subscriber)?;
    LogTracer::init()?;

    Ok(guard)
}
