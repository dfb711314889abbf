//! Tracing setup for the daemon.
use clap::ValueEnum;
use tracing::error;
use tracing_log::LogTracer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

/// Verbosity selectable on the command line.
#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(val: LogLevel) -> Self {
        match val {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn set_panic_hook() {
    // Record panics as error events, with the span context they happened
    // in when there is one.
    std::panic::set_hook(Box::new(|panic| {
        if let Some(location) = panic.location() {
            error!(
                message = %panic,
                panic.file = location.file(),
                panic.line = location.line(),
                panic.column = location.column(),
            );
        } else {
            error!(message = %panic);
        }
    }));
}

/// Install the global subscriber and the panic hook.
pub fn init(level: LevelFilter) {
    set_panic_hook();
    let subscriber = Registry::default()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(level));
    tracing::subscriber::set_global_default(subscriber)
        .expect("logging initialized more than once");
    LogTracer::init().ok();
}
