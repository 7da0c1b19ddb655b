use prometheus::{TextEncoder, Encoder, Registry, IntCounter, IntCounterVec, HistogramVec, HistogramOpts, opts};
use once_cell::sync::Lazy;
use axum::{body::Body, extract::Request, http::{HeaderValue, StatusCode}, middleware::Next, response::{IntoResponse, Response}};
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use crate::config::LogFormat;

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register<C: prometheus::core::Collector + Clone + 'static>(c: C) -> C {
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(opts!("http_requests_total", "HTTP request count"), &["method", "path", "status"]).unwrap())
});
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register(HistogramVec::new(HistogramOpts::new("http_request_duration_seconds", "HTTP request latency"), &["method", "path"]).unwrap())
});
pub static PACKAGE_UPLOAD_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new("package_upload_bytes_total", "Bytes of accepted package uploads").unwrap())
});
pub static PACKAGE_UPLOADS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(opts!("package_uploads_rejected_total", "Rejected package uploads"), &["reason"]).unwrap())
});
pub static PACKAGE_DOWNLOADS_STREAMED: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new("package_downloads_streamed_total", "Package files served").unwrap())
});
pub static DOWNLOADS_RECORDED: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new("downloads_recorded_total", "Download events recorded").unwrap())
});

/// Touch every collector so `/metrics` lists them before their first sample.
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&PACKAGE_UPLOAD_BYTES);
    Lazy::force(&PACKAGE_UPLOADS_REJECTED);
    Lazy::force(&PACKAGE_DOWNLOADS_STREAMED);
    Lazy::force(&DOWNLOADS_RECORDED);
}

pub async fn metrics_handler() -> impl IntoResponse {
    init_metrics();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&metric_families, &mut buf).is_err() { return StatusCode::INTERNAL_SERVER_ERROR.into_response(); }
    ([("Content-Type", "text/plain; version=0.0.4")], buf).into_response()
}

/// Collapse ids in a path so label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            let is_id = !seg.is_empty() && (Uuid::parse_str(seg).is_ok() || seg.chars().all(|c| c.is_ascii_digit()));
            if is_id { ":id" } else { seg }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Logs go to stderr. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, format: LogFormat) {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let res = match format {
        LogFormat::Json => tracing_subscriber::registry().with(env).with(base.json()).try_init(),
        LogFormat::Compact => tracing_subscriber::registry().with(env).with(base.compact()).try_init(),
    };
    if res.is_err() { tracing::debug!("tracing subscriber already installed"); }
}

/// Request counter, latency histogram and an `x-request-id` response header.
pub async fn track_metrics(mut req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path_label = normalize_path(req.uri().path());
    let req_id = Uuid::new_v4();
    req.extensions_mut().insert(req_id);
    let start = std::time::Instant::now();
    let mut resp = next.run(req).await;
    let status = resp.status().as_u16().to_string();
    HTTP_REQUESTS.with_label_values(&[method.as_str(), path_label.as_str(), status.as_str()]).inc();
    HTTP_REQUEST_DURATION.with_label_values(&[method.as_str(), path_label.as_str()]).observe(start.elapsed().as_secs_f64());
    if let Ok(v) = HeaderValue::from_str(&req_id.to_string()) { resp.headers_mut().insert("x-request-id", v); }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_collapsed() {
        assert_eq!(normalize_path("/api/apps/550e8400-e29b-41d4-a716-446655440000/download"), "/api/apps/:id/download");
        assert_eq!(normalize_path("/api/admin/apps/42"), "/api/admin/apps/:id");
        assert_eq!(normalize_path("/api/user/stats"), "/api/user/stats");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn registry_exposes_catalog_metrics() {
        init_metrics();
        PACKAGE_UPLOADS_REJECTED.with_label_values(&["invalid_file_type"]).inc();
        let names: Vec<String> = REGISTRY.gather().iter().map(|m| m.get_name().to_string()).collect();
        for n in ["package_uploads_rejected_total", "package_upload_bytes_total", "downloads_recorded_total"] {
            assert!(names.iter().any(|x| x == n), "{n} missing");
        }
    }
}
