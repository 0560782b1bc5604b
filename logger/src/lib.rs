//! The `logger` module configures `env_logger`
use std::sync::{Arc, LazyLock, RwLock};

static LOGGER: LazyLock<Arc<RwLock<env_logger::Logger>>> =
    LazyLock::new(|| Arc::new(RwLock::new(env_logger::Logger::from_default_env())));

pub const DEFAULT_FILTER: &str = "paychains=info";

struct LoggerShim {}

impl log::Log for LoggerShim {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        LOGGER
            .read()
            .map(|logger| logger.enabled(metadata))
            .unwrap_or(false)
    }

    fn log(&self, record: &log::Record) {
        if let Ok(logger) = LOGGER.read() {
            logger.log(record);
        }
    }

    fn flush(&self) {}
}

fn replace_logger(logger: env_logger::Logger) {
    log::set_max_level(logger.filter());
    if let Ok(mut current) = LOGGER.write() {
        *current = logger;
    }
    // Only the first call installs the shim, later calls swap the inner logger
    let _ = log::set_boxed_logger(Box::new(LoggerShim {}));
}

// Configures logging with a specific filter overriding RUST_LOG.  _RUST_LOG is used instead
// so if set it takes precedence.
// May be called at any time to re-configure the log filter
pub fn setup_with(filter: &str) {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or("_RUST_LOG", filter))
            .format_timestamp_nanos()
            .build();
    replace_logger(logger);
}

// Configures logging with a default filter if RUST_LOG is not set
pub fn setup_with_default(filter: &str) {
    let logger = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(filter))
        .format_timestamp_nanos()
        .build();
    replace_logger(logger);
}

// Configures logging with the `DEFAULT_FILTER` if RUST_LOG is not set
pub fn setup_with_default_filter() {
    setup_with_default(DEFAULT_FILTER);
}

// Configures logging with the default filter "error" if RUST_LOG is not set
pub fn setup() {
    setup_with_default("error");
}
