//! Metrics for the SAML request path.
//!
//! Counters are recorded through the `metrics` facade; the host application
//! installs whichever recorder/exporter it uses. Without the `prometheus`
//! feature every function compiles to a no-op.

#[cfg(feature = "prometheus")]
use metrics::counter;

/// Record the outcome of one SP-initiated authentication attempt.
///
/// # Arguments
/// * `outcome` - "redirected" or "failed"
/// * `error_kind` - The error kind for failures ("none" on success)
pub fn record_authn_request(outcome: &str, error_kind: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "saml_authn_requests_total",
            "outcome" => outcome.to_string(),
            "error_kind" => error_kind.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, error_kind);
    }
}

/// Record an IdP metadata parse.
pub fn record_metadata_parse(success: bool) {
    #[cfg(feature = "prometheus")]
    {
        let outcome = if success { "success" } else { "failure" };
        counter!("saml_metadata_parse_total", "outcome" => outcome.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = success;
    }
}
