//! Functional log and alert records.
//!
//! These are *data produced by twins*, not engine diagnostics: a behavior
//! calls `log_message` or `send_alert` on its context, the engine stores the
//! record in a per-model list, and the driver queries the lists after (or
//! during) a run.  Engine-internal diagnostics go through `tracing` instead.

use crate::time::SimTime;

// ── Log records ──────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogSeverity {
    Informational,
    Warning,
    Error,
}

/// One message logged by a twin instance.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogRecord {
    /// Virtual time at which the message was logged.
    pub time:       SimTime,
    pub severity:   LogSeverity,
    /// Instance that logged it.
    pub instance:   String,
    pub message:    String,
}

// ── Alerts ───────────────────────────────────────────────────────────────────

/// An alert raised by a twin, addressed to a named alert provider.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertMessage {
    pub title:    String,
    pub severity: String,
    pub message:  String,
}

/// Registration of an external alerting endpoint.
///
/// The offline engine records alerts addressed to a provider rather than
/// posting them anywhere; the configuration exists so models written against
/// it run unchanged.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertProviderConfig {
    /// Provider name, the key behaviors address alerts to.
    pub name: String,
    pub url:  String,
    /// Credential for the endpoint, when it needs one.
    pub api_key: Option<String>,
}
