use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use module_sdk::LogLevel;
use opentelemetry::metrics::Counter;
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::{logs::SdkLoggerProvider, metrics::SdkMeterProvider};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt as tfmt};

pub const SERVICE_NAME: &str = "chrome-shell";

/// Targets that end up in the JSON event log.
pub const EVENT_TARGETS: &str = "analytics=info,activation=info";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub log_level: LogLevel,
    /// Directory for the rolling log files, relative to the shell root.
    pub log_dir: PathBuf,
    /// OTLP/HTTP endpoint. When set, logs and metrics are exported there
    /// instead of being written to files.
    pub otel_endpoint: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: PathBuf::from("logs"),
            otel_endpoint: None,
        }
    }
}

/// Keeps the exporters alive; flushes them on `shutdown`.
#[derive(Default)]
pub struct TelemetryGuard {
    logger_provider: Option<SdkLoggerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        // The subscriber may already be gone, so report on stderr.
        if let Some(provider) = self.logger_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to flush log exporter: {err}");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to flush metric exporter: {err}");
            }
        }
    }
}

pub fn init_tracing(root: &Path, config: &LogConfig) -> Result<TelemetryGuard> {
    match config.otel_endpoint.as_deref() {
        Some(endpoint) => init_otlp(config.log_level, endpoint),
        None => init_files(config.log_level, &root.join(&config.log_dir)),
    }
}

static RESOURCE: OnceLock<Resource> = OnceLock::new();
fn get_resource() -> Resource {
    RESOURCE
        .get_or_init(|| Resource::builder().with_service_name(SERVICE_NAME).build())
        .clone()
}

fn init_otlp(level: LogLevel, endpoint: &str) -> Result<TelemetryGuard> {
    let log_exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("building OTLP log exporter")?;
    let logger_provider = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(get_resource())
        .build();

    let metric_exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("building OTLP metric exporter")?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(get_resource())
        .build();

    let otel_layer = {
        let filter = EnvFilter::new(level.as_filter())
            .add_directive("hyper=off".parse()?)
            .add_directive("reqwest=off".parse()?)
            .add_directive("h2=off".parse()?);
        OpenTelemetryTracingBridge::new(&logger_provider).with_filter(filter)
    };
    let fmt_layer = tfmt::layer()
        .with_thread_names(true)
        .with_filter(EnvFilter::new(level.as_filter()));

    Registry::default()
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    global::set_meter_provider(meter_provider.clone());

    Ok(TelemetryGuard {
        logger_provider: Some(logger_provider),
        meter_provider: Some(meter_provider),
    })
}

/// Plain text rolling log for everything, plus a newline-delimited JSON log
/// that only receives the analytics and activation events.
fn init_files(level: LogLevel, log_dir: &Path) -> Result<TelemetryGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let txt_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "chrome-shell.log");
    let txt_layer = tfmt::layer()
        .with_writer(txt_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(level.as_filter()));

    let json_appender =
        RollingFileAppender::new(Rotation::DAILY, log_dir, "chrome-shell-events.log");
    let json_layer = tfmt::layer()
        .json()
        .with_writer(json_appender)
        .with_target(true)
        .with_filter(EnvFilter::new(EVENT_TARGETS));

    Registry::default()
        .with(txt_layer)
        .with(json_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(TelemetryGuard::default())
}

/// Application counters. Recorded against whatever meter provider is
/// installed globally; a no-op provider when running on files only.
#[derive(Clone)]
pub struct ShellMetrics {
    cache_hits: Counter<u64>,
    cache_misses: Counter<u64>,
    load_failures: Counter<u64>,
    activations: Counter<u64>,
    session_rotations: Counter<u64>,
}

impl ShellMetrics {
    pub fn new() -> Self {
        let meter = global::meter(SERVICE_NAME);
        Self {
            cache_hits: meter
                .u64_counter("module_cache_hits")
                .with_description("Module resolutions served from the factory cache")
                .build(),
            cache_misses: meter
                .u64_counter("module_cache_misses")
                .with_description("Module resolutions that required a fetch")
                .build(),
            load_failures: meter.u64_counter("module_load_failures").build(),
            activations: meter
                .u64_counter("topic_activations")
                .with_description("Help topic activations by outcome")
                .build(),
            session_rotations: meter.u64_counter("analytics_session_rotations").build(),
        }
    }

    pub fn cache_hit(&self, namespace: &str) {
        self.cache_hits
            .add(1, &[KeyValue::new("namespace", namespace.to_string())]);
    }

    pub fn cache_miss(&self, namespace: &str) {
        self.cache_misses
            .add(1, &[KeyValue::new("namespace", namespace.to_string())]);
    }

    pub fn load_failed(&self, namespace: &str) {
        self.load_failures
            .add(1, &[KeyValue::new("namespace", namespace.to_string())]);
    }

    pub fn activation(&self, outcome: &'static str) {
        self.activations.add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn session_rotated(&self) {
        self.session_rotations.add(1, &[]);
    }
}

impl Default for ShellMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShellMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShellMetrics")
    }
}
