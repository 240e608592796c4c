use notewise_core::ConfigError;
use notewise_llm::ErrorClass;

use crate::report::FailureReport;

/// Terminal result of one [`ResilientInvoker::invoke`](crate::ResilientInvoker::invoke) call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    #[error("{label}: non-retryable {class} error after {attempts} attempt(s): {detail}")]
    Fatal {
        label: String,
        class: ErrorClass,
        status: Option<u16>,
        attempts: u32,
        detail: String,
    },

    #[error("{label}: gave up after {attempts} attempts, last {class} error: {detail}")]
    Exhausted {
        label: String,
        class: ErrorClass,
        status: Option<u16>,
        attempts: u32,
        detail: String,
    },

    #[error("{label}: cancelled after {attempts} attempt(s)")]
    Cancelled { label: String, attempts: u32 },
}

impl InvokeError {
    pub fn label(&self) -> &str {
        match self {
            InvokeError::Fatal { label, .. }
            | InvokeError::Exhausted { label, .. }
            | InvokeError::Cancelled { label, .. } => label,
        }
    }

    /// Class of the last underlying failure. `None` for cancellation.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            InvokeError::Fatal { class, .. } | InvokeError::Exhausted { class, .. } => Some(*class),
            InvokeError::Cancelled { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            InvokeError::Fatal { status, .. } | InvokeError::Exhausted { status, .. } => *status,
            InvokeError::Cancelled { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            InvokeError::Fatal { attempts, .. }
            | InvokeError::Exhausted { attempts, .. }
            | InvokeError::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            InvokeError::Fatal { detail, .. } | InvokeError::Exhausted { detail, .. } => detail,
            InvokeError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InvokeError::Cancelled { .. })
    }

    /// Retries ran out on a transient class; another route may still succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, InvokeError::Exhausted { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    TotalFailure(Box<FailureReport>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_cover_every_variant() {
        let fatal = InvokeError::Fatal {
            label: "chunk 1/3".into(),
            class: ErrorClass::ClientFault,
            status: Some(401),
            attempts: 1,
            detail: "invalid api key".into(),
        };
        assert_eq!(fatal.label(), "chunk 1/3");
        assert_eq!(fatal.class(), Some(ErrorClass::ClientFault));
        assert_eq!(fatal.status(), Some(401));
        assert!(!fatal.is_transient());

        let cancelled = InvokeError::Cancelled {
            label: "final merge".into(),
            attempts: 2,
        };
        assert_eq!(cancelled.class(), None);
        assert_eq!(cancelled.attempts(), 2);
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.to_string(), "final merge: cancelled after 2 attempt(s)");
    }
}
