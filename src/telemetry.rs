//! Tracing and optional OpenTelemetry export setup.
//!
//! Structured logging via `tracing_subscriber` is always installed, driven by `RUST_LOG`
//! (falling back to `info`). The `telemetry` feature additionally wires an OTLP exporter for
//! traces and metrics, so a deployment can forward to an observability backend without the
//! always-on cost of carrying the OTel stack in a local `--once` run.

#[cfg(feature = "telemetry")]
mod otel {
    use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
    use opentelemetry_sdk::{
        metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
        trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
        Resource,
    };
    use opentelemetry_semantic_conventions::{
        attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
        SCHEMA_URL,
    };
    use serde::{Deserialize, Serialize};
    use std::env;
    use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    #[allow(clippy::upper_case_acronyms)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum TelemetryProtocol {
        #[serde(rename = "http/protobuf")]
        HTTP,
        #[serde(rename = "grpc")]
        GRPC,
    }

    impl TelemetryProtocol {
        /// Determines telemetry protocol from environment variables if OTEL is configured.
        fn from_env() -> Option<Self> {
            let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
                || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
                || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
            if !is_enabled {
                return None;
            }
            let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
                Ok(value) if value == "grpc" => TelemetryProtocol::GRPC,
                _ => TelemetryProtocol::HTTP,
            };
            Some(protocol)
        }
    }

    fn resource() -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    fn init_meter_provider(protocol: &TelemetryProtocol) -> SdkMeterProvider {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter
                .with_http()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build(),
            TelemetryProtocol::GRPC => exporter
                .with_tonic()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build(),
        };
        let exporter = exporter.expect("failed to build OTLP metric exporter");
        let reader = PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(30))
            .build();
        let meter_provider = MeterProviderBuilder::default()
            .with_resource(resource())
            .with_reader(reader)
            .build();
        global::set_meter_provider(meter_provider.clone());
        meter_provider
    }

    fn init_tracer_provider(protocol: &TelemetryProtocol) -> SdkTracerProvider {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter.with_http().build(),
            TelemetryProtocol::GRPC => exporter.with_tonic().build(),
        };
        let exporter = exporter.expect("failed to build OTLP span exporter");
        SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(1.0))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource())
            .with_batch_exporter(exporter)
            .build()
    }

    /// Wrapper for the OTel providers this process owns, so they can be shut down cleanly.
    pub struct OtelProviders {
        tracer_provider: SdkTracerProvider,
        meter_provider: SdkMeterProvider,
    }

    impl Drop for OtelProviders {
        fn drop(&mut self) {
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("{err:?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }

    /// Installs the OTel-backed subscriber if the environment asks for it, returning the
    /// providers to keep alive for the process lifetime. Returns `None` and installs nothing
    /// if OTel isn't configured — the caller falls back to plain logging in that case.
    pub fn try_init() -> Option<OtelProviders> {
        let protocol = TelemetryProtocol::from_env()?;
        let tracer_provider = init_tracer_provider(&protocol);
        let meter_provider = init_meter_provider(&protocol);
        let tracer = tracer_provider.tracer("airkeeper");

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(tracing_subscriber::fmt::layer())
            .with(MetricsLayer::new(meter_provider.clone()))
            .with(OpenTelemetryLayer::new(tracer))
            .init();

        tracing::info!(?protocol, "opentelemetry tracing and metrics exporter enabled");
        Some(OtelProviders {
            tracer_provider,
            meter_provider,
        })
    }
}

/// Owns whatever telemetry state was installed for the process lifetime; dropping it flushes
/// and shuts down any exporters.
pub struct Telemetry {
    #[cfg(feature = "telemetry")]
    _otel: Option<otel::OtelProviders>,
}

impl Telemetry {
    /// Installs the process-wide tracing subscriber. With the `telemetry` feature enabled
    /// and `OTEL_EXPORTER_OTLP_*` set in the environment, traces and metrics are additionally
    /// exported via OTLP; otherwise this only sets up structured stdout logging.
    pub fn init() -> Self {
        #[cfg(feature = "telemetry")]
        {
            if let Some(otel) = otel::try_init() {
                return Self { _otel: Some(otel) };
            }
        }

        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(tracing_subscriber::fmt::layer())
            .init();

        #[cfg(feature = "telemetry")]
        {
            Self { _otel: None }
        }
        #[cfg(not(feature = "telemetry"))]
        {
            Self {}
        }
    }
}
