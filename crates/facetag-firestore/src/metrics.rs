//! Catalog request metrics.

use std::time::Duration;

use metrics::{counter, histogram};

pub const CATALOG_REQUESTS_TOTAL: &str = "facetag_catalog_requests_total";
pub const CATALOG_REQUEST_SECONDS: &str = "facetag_catalog_request_seconds";

/// Count one Firestore call; `status` is the HTTP status, 0 when none arrived.
pub fn record_request(operation: &'static str, status: u16, elapsed: Duration) {
    counter!(
        CATALOG_REQUESTS_TOTAL,
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(CATALOG_REQUEST_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}
