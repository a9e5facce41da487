//! `autoheal run`: demo pipeline for a CI failure event

use autoheal::{provider_from_config, CiEvent, LocalRetriever, Pipeline, PipelineStatus, StructuralValidator};

use super::Context;
use crate::commands::RunArgs;
use crate::output::{Status, StatusPayload};
use crate::CliResult;

/// Run the pipeline once.
///
/// A rejected patch is returned as a `failed` payload; the caller decides
/// the exit code.
pub fn execute_run(ctx: &Context, args: &RunArgs) -> CliResult<StatusPayload> {
    let event = CiEvent::load(&args.event)?;
    let pipeline = Pipeline::new(
        &ctx.config,
        provider_from_config(&ctx.config.llm),
        Box::new(LocalRetriever::new(&ctx.config.vectordb.base_path)),
        Box::new(StructuralValidator::new()),
        Box::new(ctx.artifacts.clone()),
        Box::new(ctx.ledger.clone()),
    );
    let outcome = pipeline.run(&event, &args.workspace)?;

    let payload = match outcome.status {
        PipelineStatus::Merged => {
            ctx.reporter.success("Auto-healed and merged");
            StatusPayload::new(Status::Success, "Auto-healed and merged")
        }
        PipelineStatus::Failed => {
            let reason = outcome.validation.reason().unwrap_or("patch rejected").to_string();
            ctx.reporter.failure(&format!("Validation failed: {reason}"));
            StatusPayload::new(Status::Failed, reason)
        }
    };
    Ok(payload
        .with("validation", &outcome.validation)
        .with("workspace", &outcome.workspace))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::handlers::test_support::context;
    use tempfile::TempDir;

    fn event(dir: &TempDir) -> std::path::PathBuf {
        std::fs::write(dir.path().join("test.log"), "AssertionError: #btnCheckout not found\n").unwrap();
        let event = serde_json::json!({
            "test_name": "test_checkout",
            "log_path": dir.path().join("test.log"),
            "broken_locator": "btnCheckout",
        });
        let path = dir.path().join("event.json");
        std::fs::write(&path, event.to_string()).unwrap();
        path
    }

    #[test]
    fn test_valid_workspace_merges() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ws")).unwrap();
        let ctx = context(&dir);
        let args = RunArgs {
            event: event(&dir),
            workspace: dir.path().join("ws"),
        };
        let payload = execute_run(&ctx, &args).unwrap();
        assert_eq!(payload.status, Status::Success);
        assert_eq!(payload.fields["validation"]["ok"], true);

        let entries = ctx.ledger.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, "merged");
    }

    #[test]
    fn test_missing_workspace_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let args = RunArgs {
            event: event(&dir),
            workspace: dir.path().join("missing"),
        };
        let payload = execute_run(&ctx, &args).unwrap();
        assert_eq!(payload.status, Status::Failed);
        assert_eq!(ctx.ledger.read_all().unwrap()[0].outcome, "failed");
    }

    #[test]
    fn test_missing_event_is_an_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let args = RunArgs {
            event: dir.path().join("nope.json"),
            workspace: dir.path().to_path_buf(),
        };
        assert!(execute_run(&ctx, &args).is_err());
    }
}
