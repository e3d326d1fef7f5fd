//! Confirmation prompt with CI fallback

use super::context::UiContext;
use crate::error::{JobCacheError, JobCacheResult};

/// Ask for confirmation
///
/// `--yes` approves without asking. Without a terminal the answer is `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> JobCacheResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| JobCacheError::User(format!("Prompt task failed: {}", e)))?
    .map_err(|e| JobCacheError::User(format!("Prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_yes_approves() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Purge?", false).await.unwrap());
    }

    #[tokio::test]
    async fn non_interactive_uses_default() {
        let ctx = UiContext::non_interactive();
        assert!(!confirm(&ctx, "Purge?", false).await.unwrap());
        assert!(confirm(&ctx, "Purge?", true).await.unwrap());
    }
}
