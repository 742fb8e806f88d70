use anyhow::Result;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_FILTER: &str = "info,mise_router=debug,tower_http=info";
const DEFAULT_DIR: &str = "logs";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where and how the router logs, read from the process environment
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// `EnvFilter` directives (`RUST_LOG`)
    pub filter: String,
    /// `LOG_FORMAT=json`
    pub json: bool,
    /// Daily rolling file directory (`LOG_DIR`); an empty value disables the file
    pub dir: Option<String>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dir = lookup("LOG_DIR").unwrap_or_else(|| DEFAULT_DIR.to_string());
        Self {
            filter: lookup("RUST_LOG")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            dir: (!dir.trim().is_empty()).then_some(dir),
        }
    }

    fn stdout_layer(&self) -> BoxedLayer {
        if self.json {
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_thread_ids(true)
                .boxed()
        } else {
            fmt::layer().pretty().with_writer(std::io::stdout).boxed()
        }
    }

    fn file_layer(&self) -> Result<Option<BoxedLayer>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("mise-router")
            .filename_suffix("log")
            .build(dir)?;

        let layer = if self.json {
            fmt::layer()
                .json()
                .with_writer(appender)
                .with_thread_ids(true)
                .boxed()
        } else {
            fmt::layer().with_writer(appender).with_ansi(false).boxed()
        };
        Ok(Some(layer))
    }
}

/// Install the global subscriber: stdout, plus the rolling file unless disabled
pub fn init_logger() -> Result<()> {
    init_with(&LogSettings::from_env())
}

pub fn init_with(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::try_new(&settings.filter)?;

    let mut layers = vec![settings.stdout_layer()];
    layers.extend(settings.file_layer()?);

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(())
}
