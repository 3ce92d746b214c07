//! The confirmation decision surface. Narrow on purpose: the engine only
//! ever asks "is this approved", never how the answer was obtained.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmResult {
    pub approved: bool,
    pub timed_out: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, message: &str) -> ConfirmResult;
}

/// `batch_mode` / `auto_approve`: decides immediately without asking
/// anyone. `default_deny` flips which way an unattended decision lands;
/// production config always sets it `false` for `auto_approve` (approve)
/// while leaving room for a conservative `batch_mode` that defaults to
/// deny.
pub struct BatchConfirmer {
    pub default_deny: bool,
}

impl BatchConfirmer {
    pub fn auto_approve() -> Self {
        Self { default_deny: false }
    }
}

#[async_trait]
impl Confirmer for BatchConfirmer {
    async fn confirm(&self, _message: &str) -> ConfirmResult {
        ConfirmResult {
            approved: !self.default_deny,
            timed_out: false,
            error: None,
        }
    }
}

/// The interactive strategy. Direct calls always fail: attestation for
/// an interactive session can only arrive through the two-phase
/// `execute_confirmed_action` tool, never through this trait.
pub struct McpPromptConfirmer;

#[async_trait]
impl Confirmer for McpPromptConfirmer {
    async fn confirm(&self, _message: &str) -> ConfirmResult {
        ConfirmResult {
            approved: false,
            timed_out: false,
            error: Some(
                "interactive confirmation must arrive via execute_confirmed_action".to_string(),
            ),
        }
    }
}

/// A cancelled confirmer returns `timed_out = true` with
/// `approved = !default_deny`.
pub fn timed_out(default_deny: bool) -> ConfirmResult {
    ConfirmResult {
        approved: !default_deny,
        timed_out: true,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_confirmer_approves_when_not_default_deny() {
        let c = BatchConfirmer { default_deny: false };
        let r = c.confirm("delete ABC").await;
        assert!(r.approved);
        assert!(!r.timed_out);
    }

    #[tokio::test]
    async fn batch_confirmer_denies_when_default_deny() {
        let c = BatchConfirmer { default_deny: true };
        let r = c.confirm("delete ABC").await;
        assert!(!r.approved);
    }

    #[tokio::test]
    async fn mcp_prompt_confirmer_always_errors() {
        let c = McpPromptConfirmer;
        let r = c.confirm("delete ABC").await;
        assert!(!r.approved);
        assert!(r.error.is_some());
    }
}
