/*!
 * Logging Module
 * Console plus daily-rolling app and error files
 */
pub mod config;
pub mod middleware;

use std::{io, path::PathBuf};

use tracing_appender::{
    non_blocking,
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt,
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Where and how the server logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub level: String,
    pub json: bool,
}

impl LogSettings {
    /// `LOG_DIR` (default `logs`), `LOG_LEVEL` (debug, or info in production)
    /// and `LOG_FORMAT` (`json` or `pretty`; JSON by default in production).
    pub fn from_lookup<F>(environment: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_production = environment == "production";
        let json = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => true,
            Some("pretty") => false,
            _ => is_production,
        };
        Self {
            dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()).into(),
            level: lookup("LOG_LEVEL")
                .unwrap_or_else(|| if is_production { "info" } else { "debug" }.to_string()),
            json,
        }
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directives(&self) -> String {
        format!(
            "studio_backend={level},studio_console={level},tower_http=info,sqlx=warn",
            level = self.level
        )
    }
}

fn file_layer(writer: NonBlocking, json: bool) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    if json {
        layer.json().with_thread_ids(true).boxed()
    } else {
        layer.boxed()
    }
}

fn console_layer(writer: NonBlocking, json: bool) -> BoxedLayer {
    if json {
        fmt::layer().json().with_writer(writer).with_target(false).boxed()
    } else {
        fmt::layer().with_writer(writer).with_target(true).pretty().boxed()
    }
}

/// Installs the global subscriber. The writers flush on drop, so the
/// returned guards must live as long as the process.
pub fn init(environment: &str) -> Vec<WorkerGuard> {
    let settings = LogSettings::from_lookup(environment, |name| std::env::var(name).ok());

    if let Err(e) = std::fs::create_dir_all(&settings.dir) {
        eprintln!("could not create log directory {}: {e}", settings.dir.display());
    }

    let (app_writer, app_guard) = non_blocking(rolling::daily(&settings.dir, "app.log"));
    let (error_writer, error_guard) = non_blocking(rolling::daily(&settings.dir, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_directives()));

    let layers: Vec<BoxedLayer> = vec![
        file_layer(app_writer, settings.json),
        file_layer(error_writer, settings.json)
            .with_filter(LevelFilter::ERROR)
            .boxed(),
        console_layer(console_writer, settings.json),
    ];

    tracing_subscriber::registry().with(env_filter).with(layers).init();

    tracing::info!(
        environment,
        dir = %settings.dir.display(),
        json = settings.json,
        "logging initialized"
    );
    vec![app_guard, error_guard, console_guard]
}
