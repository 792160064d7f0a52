#![forbid(unsafe_code)]

//! Error taxonomy and the injected reporting capability.
//!
//! Stream errors are not represented here: they are data and end up in the
//! slot's `error` field. [`RxScopeError`] only covers structural misuse.

/// Structural failures of the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RxScopeError {
    /// The bound reference does not hold a stream.
    #[error("slot `{label}` should be bound to a stream")]
    NotAStream { label: String },

    /// A batched subscribe had neither an explicit nor a default scope.
    #[error("no scope provided to batch notifications against")]
    NoScope,

    /// A flush kept scheduling new work past the configured pass limit.
    #[error("batched apply did not settle after {ttl} passes")]
    FlushOverflow { ttl: usize },
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, RxScopeError>;

/// Sink for non-fatal configuration errors.
///
/// The controller never raises on a bad binding; it hands the error to its
/// reporter and carries on with an empty slot.
pub trait ErrorReporter {
    fn report(&self, error: &RxScopeError);
}

/// Default reporter: one `tracing` error event per report.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &RxScopeError) {
        tracing::error!(error = %error, "rxscope binding rejected");
    }
}
