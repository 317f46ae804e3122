//! Local hostname lookup for the SMTP greeting.

use std::env;

use tracing::warn;

/// Used when the hostname cannot be determined.
pub const FALLBACK_HOSTNAME: &str = "hostname-not-available";

/// Get the local hostname.
///
/// Tries the `HOSTNAME` environment variable, then `gethostname(2)`, then
/// falls back to [`FALLBACK_HOSTNAME`].
pub fn local_hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    match nix::unistd::gethostname() {
        Ok(hostname) => match hostname.into_string() {
            Ok(hostname) if !hostname.is_empty() => return hostname,
            _ => warn!("hostname_not_utf8"),
        },
        Err(e) => warn!(error = %e, "hostname_lookup_failed"),
    }

    warn!(hostname = FALLBACK_HOSTNAME, "hostname_fallback");
    FALLBACK_HOSTNAME.to_string()
}
