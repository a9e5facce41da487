//! `autoheal heal-text-rename`: replace a UI string across a tests repository

use autoheal::pipeline::{record_index_manifest, record_llm_info, FailureContext, Prompt};
use autoheal::{
    find_and_replace_text, provider_from_config, CommandExecutor, GitHistoryRetriever, LedgerEntry, LedgerSink,
    PatchRequest, RetrievalQuery, Retriever, TestExecutor,
};
use std::path::Path;
use tracing::{info, warn};

use super::Context;
use crate::commands::TextRenameArgs;
use crate::output::StatusPayload;
use crate::CliResult;

/// Commits ingested from the app repository
const HISTORY_COMMITS: usize = 50;

/// Records retrieved for the prompt
const HISTORY_K: usize = 10;

/// Test command for a tests repository, if its layout is recognised
#[must_use]
pub fn local_test_command(repo: &Path) -> Option<&'static str> {
    if repo.join("package.json").exists() {
        Some("npm test --silent")
    } else if repo.join("pytest.ini").exists() || repo.join("tests").exists() {
        Some("python -m pytest -q")
    } else if repo.join("gradlew").exists() {
        Some("./gradlew test")
    } else {
        None
    }
}

fn retrieve_history(ctx: &Context, app_repo: Option<&Path>, old: &str) -> Vec<autoheal::retriever::ScoredRecord> {
    let Some(app_repo) = app_repo else {
        return Vec::new();
    };
    let retriever = GitHistoryRetriever::new(&ctx.config.vectordb.base_path);
    let retrieved = retriever
        .ingest_commits(app_repo, HISTORY_COMMITS)
        .and_then(|_| retriever.topk(&RetrievalQuery::new().with("text", old), HISTORY_K));
    retrieved.unwrap_or_else(|e| {
        info!(error = %e, "Git history retrieval failed");
        Vec::new()
    })
}

fn ask_provider(ctx: &Context, args: &TextRenameArgs, prompt: &Prompt) {
    record_llm_info(&ctx.artifacts, &ctx.config.llm);
    let provider = provider_from_config(&ctx.config.llm);
    info!(provider = provider.name(), model = %ctx.config.llm.model, "Asking provider for rename patch");

    let patch = serde_json::to_value(prompt)
        .map_err(|e| e.to_string())
        .map(PatchRequest::text_rename)
        .and_then(|request| provider.generate_patch(&request).map_err(|e| e.to_string()))
        .and_then(|response| serde_json::to_value(response).map_err(|e| e.to_string()));
    let mut patch = match patch {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => serde_json::Map::new(),
        Err(e) => {
            warn!(error = %e, "Provider failed, applying rename deterministically");
            serde_json::Map::new()
        }
    };
    patch.insert("action".to_string(), "text_rename".into());
    patch.insert("from".to_string(), args.old.clone().into());
    patch.insert("to".to_string(), args.new.clone().into());
    ctx.store("patch_text_rename.json", &patch);
}

fn run_local_tests(repo: &Path) {
    let Some(command) = local_test_command(repo) else {
        return;
    };
    let outcome = CommandExecutor::new(command, repo).run("text_rename");
    if outcome.passed {
        info!(command, "Local tests passed after rename");
    } else {
        warn!(command, error = ?outcome.error, "Local tests failed after rename");
    }
}

/// Rename `old` to `new` in the tests repository and publish the change
pub fn execute_text_rename(ctx: &Context, args: &TextRenameArgs) -> CliResult<StatusPayload> {
    let retrieved = retrieve_history(ctx, args.app_repo.as_deref(), &args.old);
    record_index_manifest(
        &ctx.artifacts,
        &ctx.config.vectordb.base_path,
        "rag_index_manifest_text_rename.json",
    );

    let failure = FailureContext {
        test_name: "text_rename".to_string(),
        logs: format!("expected '{}'", args.old),
        dom_snapshot_path: String::new(),
        broken_locator: args.old.clone(),
        workspace: args.tests_repo.clone(),
    };
    let prompt = Prompt::build(failure, retrieved);
    ask_provider(ctx, args, &prompt);

    let report = find_and_replace_text(&args.tests_repo, &args.old, &args.new)?;
    ctx.store("text_rename_result.json", &report);
    for file in &report.files {
        ctx.reporter.detail(&format!("Renamed in {}", file.display()));
    }
    run_local_tests(&args.tests_repo);

    let entry = LedgerEntry::new("text_rename", &args.tests_repo, "applied")
        .with_patch_summary(format!("'{}' -> '{}' in {} files", args.old, args.new, report.changed_files));
    if let Err(e) = ctx.ledger.append(&entry) {
        warn!(error = %e, "Ledger append failed");
    }

    let title = format!("Auto-heal: rename '{}' -> '{}'", args.old, args.new);
    Ok(ctx
        .publish(
            &args.tests_repo,
            &args.publish,
            &title,
            "Automated patch",
            "Applied rename locally (no PR)",
            "Applied rename locally; PR not opened",
        )
        .with("changed_files", report.changed_files))
}
