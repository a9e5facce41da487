//! `autoheal heal`: one propose-apply-verify cycle

use autoheal::{CommandExecutor, HealOutcome, HealRequest, HealStatus, Orchestrator, Platform};

use super::Context;
use crate::commands::HealArgs;
use crate::output::{Status, StatusPayload};
use crate::CliResult;

/// Payload status for a terminal heal status
#[must_use]
pub const fn status_for(status: HealStatus) -> Status {
    match status {
        HealStatus::Healed => Status::Success,
        HealStatus::AlreadyPassed | HealStatus::NoCandidateFound => Status::Noop,
        HealStatus::FailedValidation => Status::Failed,
    }
}

/// Summary line for an outcome
#[must_use]
pub fn message_for(outcome: &HealOutcome) -> String {
    match outcome.status {
        HealStatus::Healed => format!("Healed {}", outcome.test_id),
        HealStatus::AlreadyPassed => format!("{} already passes", outcome.test_id),
        HealStatus::NoCandidateFound => format!("No replacement locator found for {}", outcome.test_id),
        HealStatus::FailedValidation => {
            let reason = outcome.reason.as_deref().unwrap_or("test still failing");
            format!("Patch for {} rolled back: {reason}", outcome.test_id)
        }
    }
}

/// Run one heal cycle with the configured test command
pub fn execute_heal(ctx: &Context, args: &HealArgs) -> CliResult<StatusPayload> {
    let executor = CommandExecutor::new(&ctx.config.ci.test_command, &args.tests_dir);
    let orchestrator = Orchestrator::from_config(
        &ctx.config,
        &args.tests_dir,
        Box::new(executor),
        Box::new(ctx.artifacts.clone()),
        Box::new(ctx.ledger.clone()),
    );

    let platform = Platform::from(args.platform);
    let mut request = HealRequest::new(&args.test, &args.snapshot, &args.old, platform);
    if let Some(target) = &args.target {
        request = request.with_target(target);
    }
    let outcome = orchestrator.run_once(&request)?;

    let message = message_for(&outcome);
    match outcome.status {
        HealStatus::Healed => ctx.reporter.success(&message),
        HealStatus::FailedValidation => ctx.reporter.failure(&message),
        _ => ctx.reporter.info(&message),
    }
    Ok(StatusPayload::new(status_for(outcome.status), message).with("heal", &outcome))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::PlatformArg;
    use crate::handlers::test_support::context;
    use tempfile::TempDir;

    fn args(dir: &TempDir, platform: PlatformArg) -> HealArgs {
        HealArgs {
            test: "failing_test".to_string(),
            snapshot: dir.path().join("snap.html"),
            old: "btnCheckout".to_string(),
            platform,
            target: None,
            tests_dir: dir.path().join("tests"),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(HealStatus::Healed), Status::Success);
        assert_eq!(status_for(HealStatus::AlreadyPassed), Status::Noop);
        assert_eq!(status_for(HealStatus::NoCandidateFound), Status::Noop);
        assert_eq!(status_for(HealStatus::FailedValidation), Status::Failed);
    }

    #[test]
    fn test_passing_command_is_already_passed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        let mut ctx = context(&dir);
        ctx.config.ci.test_command = "true {test}".to_string();
        let payload = execute_heal(&ctx, &args(&dir, PlatformArg::Web)).unwrap();
        assert_eq!(payload.status, Status::Noop);
        assert_eq!(payload.fields["heal"]["status"], "already_passed");
    }

    #[test]
    fn test_android_is_a_hard_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        let ctx = context(&dir);
        assert!(execute_heal(&ctx, &args(&dir, PlatformArg::Android)).is_err());
    }
}
