/* Logger initialization */
use std::panic::{self, PanicHookInfo};
use std::thread;

use tracing::{error, level_filters::LevelFilter};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::CargoEnv;

// panics with this prefix are expected enough that a backtrace is just noise
const NO_TRACE_PREFIX: &str = "notrace - ";

pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
    // none when there's no dsn
    pub _sentry_guard: Option<sentry::ClientInitGuard>,
}

pub struct Logger {}

impl Logger {
    pub fn init(cargo_env: CargoEnv, sentry_dsn: Option<String>) -> LoggerGuards {
        // the resolver logs every hop at debug, way too much for a terminal
        let max_level = match cargo_env {
            CargoEnv::Development => LevelFilter::INFO,
            CargoEnv::Production => LevelFilter::DEBUG,
        };

        let (non_blocking, guard) = match cargo_env {
            CargoEnv::Development => tracing_appender::non_blocking(std::io::stdout()),
            CargoEnv::Production => tracing_appender::non_blocking(
                tracing_appender::rolling::daily("logs", "dlhd-edge.log"),
            ),
        };

        let sentry_guard = sentry_dsn
            .filter(|dsn| !dsn.is_empty())
            .map(|dsn| Self::init_sentry(dsn, cargo_env));

        let registry = tracing_subscriber::registry()
            .with(max_level)
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking));

        if sentry_guard.is_some() {
            registry.with(sentry_tracing::layer()).init();
        } else {
            registry.init();
        }

        panic::set_hook(Box::new(Self::log_panic));

        LoggerGuards {
            _tracing_guard: guard,
            _sentry_guard: sentry_guard,
        }
    }

    fn init_sentry(dsn: String, cargo_env: CargoEnv) -> sentry::ClientInitGuard {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(
                    match cargo_env {
                        CargoEnv::Development => "development",
                        CargoEnv::Production => "production",
                    }
                    .into(),
                ),
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    }

    fn log_panic(info: &PanicHookInfo<'_>) {
        let current = thread::current();
        let thread = current.name().unwrap_or("unknown");

        let payload = info
            .payload()
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Box<Any>");

        let location = info
            .location()
            .map(|l| format!(": {}:{}", l.file(), l.line()))
            .unwrap_or_default();

        match payload.strip_prefix(NO_TRACE_PREFIX) {
            Some(msg) => error!(
                target: "panic", "thread '{}' panicked at '{}'{}",
                thread, msg, location
            ),
            None => error!(
                target: "panic", "thread '{}' panicked at '{}'{}\n{:?}",
                thread,
                payload,
                location,
                backtrace::Backtrace::new()
            ),
        }
    }
}
