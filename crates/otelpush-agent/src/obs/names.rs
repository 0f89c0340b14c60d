//! Metric catalogue: every name the agent emits.

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUESTS_GET: &str = "http_requests_get";
pub const HTTP_REQUESTS_POST: &str = "http_requests_post";
pub const HTTP_REQUESTS_PUT: &str = "http_requests_put";
pub const HTTP_REQUESTS_DELETE: &str = "http_requests_delete";
/// Per-endpoint counter, carries an `endpoint` attribute.
pub const HTTP_REQUESTS_ENDPOINT: &str = "http_requests_endpoint";

pub const AUTH_SUCCESS: &str = "auth_attempts_success";
pub const AUTH_FAILURE: &str = "auth_attempts_failure";

pub const ORDERS_COMPLETED: &str = "orders_completed";
pub const ORDERS_FAILED: &str = "orders_failed";
pub const ITEMS_SOLD: &str = "items_sold";
/// Revenue in integer cents.
pub const REVENUE_CENTS: &str = "revenue_cents";

pub const CPU_PERCENT: &str = "cpu_percent";
pub const MEMORY_PERCENT: &str = "memory_percent";
pub const ACTIVE_USERS: &str = "active_users";

/// Service-wide latency family.
pub const REQUEST_LATENCY: &str = "request_latency";
/// Per-endpoint latency family.
pub const ENDPOINT_LATENCY: &str = "endpoint_latency";

pub const ATTR_SOURCE: &str = "source";
pub const ATTR_ENDPOINT: &str = "endpoint";

/// Endpoint key used once `max_endpoints` distinct keys have been seen.
pub const OVERFLOW_ENDPOINT: &str = "OTHER";

pub const UNIT_COUNT: &str = "1";
pub const UNIT_PERCENT: &str = "%";
pub const UNIT_MILLIS: &str = "ms";
pub const UNIT_CENTS: &str = "cents";

/// Counters present (at zero) from process start.
pub const DECLARED_COUNTERS: [(&str, &str); 11] = [
    (HTTP_REQUESTS_TOTAL, UNIT_COUNT),
    (HTTP_REQUESTS_GET, UNIT_COUNT),
    (HTTP_REQUESTS_POST, UNIT_COUNT),
    (HTTP_REQUESTS_PUT, UNIT_COUNT),
    (HTTP_REQUESTS_DELETE, UNIT_COUNT),
    (AUTH_SUCCESS, UNIT_COUNT),
    (AUTH_FAILURE, UNIT_COUNT),
    (ORDERS_COMPLETED, UNIT_COUNT),
    (ORDERS_FAILED, UNIT_COUNT),
    (ITEMS_SOLD, UNIT_COUNT),
    (REVENUE_CENTS, UNIT_CENTS),
];

/// Method-specific counter; `None` for anything but GET/POST/PUT/DELETE.
pub fn method_counter(method: &str) -> Option<&'static str> {
    match method {
        "GET" => Some(HTTP_REQUESTS_GET),
        "POST" => Some(HTTP_REQUESTS_POST),
        "PUT" => Some(HTTP_REQUESTS_PUT),
        "DELETE" => Some(HTTP_REQUESTS_DELETE),
        _ => None,
    }
}

/// `"METHOD PATH"` key shared by the endpoint counter and latency family.
pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}
