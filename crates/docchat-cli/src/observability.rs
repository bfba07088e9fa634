//! Log setup for the `docchat` binary.
//!
//! Streamed answers own stdout, so log records go to stderr (compact) or to a
//! JSONL file, never to stdout.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "docchat.logs.jsonl";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    JsonFile(PathBuf),
}

/// Resolved logging choices for one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub sink: LogSink,
}

impl LogSettings {
    /// Combines flags with `DOCCHAT_LOG`, `DOCCHAT_LOG_LEVEL`,
    /// `DOCCHAT_JSON_LOG_PATH` and `RUST_LOG`. Flags win over the environment.
    ///
    /// Returns `None` when `DOCCHAT_LOG` turns logging off and no flag asks
    /// for it.
    pub fn resolve(
        level_flag: Option<&str>,
        file_flag: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        let requested = level_flag.is_some() || file_flag.is_some();
        if !requested && env("DOCCHAT_LOG").is_some_and(|v| is_off(&v)) {
            return None;
        }

        let filter = level_flag
            .map(str::to_string)
            .or_else(|| env("DOCCHAT_LOG_LEVEL"))
            .or_else(|| env("RUST_LOG"))
            .filter(|f| EnvFilter::try_new(f).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let sink = file_flag
            .map(Path::to_path_buf)
            .or_else(|| env("DOCCHAT_JSON_LOG_PATH").map(PathBuf::from))
            .map_or(LogSink::Stderr, LogSink::JsonFile);
        Some(Self { filter, sink })
    }
}

fn is_off(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Installs the global subscriber once. Later calls are no-ops.
pub fn init(settings: Option<LogSettings>) {
    INIT.get_or_init(|| {
        let Some(settings) = settings else {
            return;
        };
        let filter = EnvFilter::new(&settings.filter);
        match settings.sink {
            LogSink::JsonFile(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogSink::Stderr => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_warn_on_stderr() {
        let settings = LogSettings::resolve(None, None, env_of(&[])).expect("enabled");
        assert_eq!(settings.filter, "warn");
        assert_eq!(settings.sink, LogSink::Stderr);
    }

    #[test]
    fn flags_win_over_environment() {
        let env = env_of(&[
            ("DOCCHAT_LOG_LEVEL", "info"),
            ("DOCCHAT_JSON_LOG_PATH", "/tmp/env.jsonl"),
        ]);
        let settings = LogSettings::resolve(
            Some("docchat_stream=debug"),
            Some(Path::new("logs/run.jsonl")),
            env,
        )
        .expect("enabled");
        assert_eq!(settings.filter, "docchat_stream=debug");
        assert_eq!(settings.sink, LogSink::JsonFile(PathBuf::from("logs/run.jsonl")));
    }

    #[test]
    fn level_falls_back_through_env_and_rejects_bad_filters() {
        let settings =
            LogSettings::resolve(None, None, env_of(&[("RUST_LOG", "debug")])).expect("enabled");
        assert_eq!(settings.filter, "debug");

        let settings =
            LogSettings::resolve(Some("docchat_stream=loud"), None, env_of(&[])).expect("enabled");
        assert_eq!(settings.filter, "warn");
    }

    #[test]
    fn off_switch_yields_to_explicit_flags() {
        assert_eq!(
            LogSettings::resolve(None, None, env_of(&[("DOCCHAT_LOG", "off")])),
            None
        );
        assert!(
            LogSettings::resolve(Some("info"), None, env_of(&[("DOCCHAT_LOG", "off")])).is_some()
        );
    }
}
