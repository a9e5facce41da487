//! Mapping-file updates: by logical name, or from identifiers found in app sources

use autoheal::pipeline::{record_index_manifest, record_llm_info};
use autoheal::provider::RuleBasedProvider;
use autoheal::{
    discover, plan_updates, provider_from_config, AppPlatform, LedgerEntry, LedgerSink, MappingContext,
    MappingUpdate, MappingUpdater, PatchRequest, UpdatePlan,
};
use serde_json::json;
use tracing::{info, warn};

use super::Context;
use crate::commands::{MappingsByNameArgs, MappingsFromAppArgs};
use crate::output::{Status, StatusPayload};
use crate::CliResult;

fn record_ledger(ctx: &Context, action: &str, repo: &std::path::Path, outcome: &str, summary: String) {
    let entry = LedgerEntry::new(action, repo, outcome).with_patch_summary(summary);
    if let Err(e) = ctx.ledger.append(&entry) {
        warn!(error = %e, "Ledger append failed");
    }
}

/// Set the identifiers of one logical name across every module
pub fn execute_mappings_by_name(ctx: &Context, args: &MappingsByNameArgs) -> CliResult<StatusPayload> {
    let updater = MappingUpdater::from_config(&ctx.config.mappings);
    let update = MappingUpdate::new(&args.logical, &args.android_id, &args.ios_id);
    let report = updater.update(&args.tests_repo, &update)?;
    ctx.store("bulk_update_result.json", &report);
    for file in report.changed_files() {
        ctx.reporter.detail(&format!("Updated {}", file.display()));
    }

    if report.updated == 0 {
        ctx.reporter.info("No files needed changes");
        return Ok(StatusPayload::new(Status::Noop, "No files needed changes"));
    }
    record_ledger(
        ctx,
        "update_mappings",
        &args.tests_repo,
        "applied",
        format!("{} in {} files", args.logical, report.updated),
    );

    let title = format!("Auto-heal: update identifiers for {}", args.logical);
    Ok(ctx
        .publish(
            &args.tests_repo,
            &args.publish,
            &title,
            "Bulk update across modules",
            "Updated locally (no PR)",
            "Updated locally; PR not opened",
        )
        .with("changed", report.updated))
}

fn plan_artifact(plan: &UpdatePlan) -> serde_json::Value {
    let planned: Vec<_> = plan
        .updates
        .iter()
        .map(|u| json!({"logical": u.logical_name, "android": u.android_identifier, "ios": u.ios_identifier}))
        .collect();
    json!({
        "attempted_count": plan.updates.len(),
        "planned_updates": planned,
        "rule_mapped": plan.rule_mapped,
        "unresolved": plan.unresolved,
    })
}

fn build_plan(ctx: &Context, platform: AppPlatform, ids: &[String], only_logical: Option<&str>) -> UpdatePlan {
    let context = MappingContext::from_app(&ctx.config.app, platform);
    let provider = provider_from_config(&ctx.config.llm);
    let planned = plan_updates(platform, ids, &context, provider.as_ref(), only_logical).or_else(|e| {
        warn!(error = %e, "Provider failed, using rule-based mappings only");
        plan_updates(platform, ids, &context, &RuleBasedProvider, only_logical)
    });
    let plan = planned.unwrap_or_else(|e| {
        warn!(error = %e, "Planning failed");
        UpdatePlan::default()
    });

    if !plan.unresolved.is_empty() {
        info!(provider = provider.name(), model = %ctx.config.llm.model, "Provider consulted for unresolved identifiers");
        record_llm_info(&ctx.artifacts, &ctx.config.llm);
        let context = serde_json::to_value(&context).unwrap_or_default();
        ctx.store(
            "llm_request_identifiers.json",
            &PatchRequest::map_identifiers(platform, plan.unresolved.clone(), context),
        );
        ctx.store("llm_response_identifiers.json", &json!({"suggestions": plan.suggestions}));
    }
    plan
}

/// Discover identifiers in the app, map them, and update every module's mappings
pub fn execute_mappings_from_app(ctx: &Context, args: &MappingsFromAppArgs) -> CliResult<StatusPayload> {
    let app = &ctx.config.app;
    ctx.store(
        "config_app_snapshot.json",
        &json!({
            "platform": app.platform,
            "testid_to_logical": app.testid_to_logical,
            "testid_patterns": app.testid_patterns,
            "ios_to_logical": app.ios_to_logical,
            "android_to_logical": app.android_to_logical,
            "ts": chrono::Utc::now(),
        }),
    );

    let platform: AppPlatform = match app.platform.parse() {
        Ok(platform) => platform,
        Err(e) => {
            warn!(error = %e, "Unknown app platform");
            let message = format!("Unknown platform '{}'", app.platform);
            ctx.reporter.info(&message);
            return Ok(StatusPayload::new(Status::Noop, message));
        }
    };

    let ids = discover(&args.app_repo, platform, &ctx.config.source_files)?;
    ctx.reporter.detail(&format!("Discovered {} {platform} identifiers", ids.len()));
    let mut discovered = serde_json::Map::new();
    discovered.insert(platform.as_str().to_string(), json!(ids));
    ctx.store("identifiers_discovered.json", &discovered);
    ctx.store(
        "identifiers_discovered_runtime.json",
        &json!({
            "platform": platform,
            "ids": ids,
            "rn_map_keys": app.testid_to_logical.keys().collect::<Vec<_>>(),
            "rn_patterns": app.testid_patterns,
            "ios_map_keys": app.ios_to_logical.keys().collect::<Vec<_>>(),
            "android_map_keys": app.android_to_logical.keys().collect::<Vec<_>>(),
        }),
    );

    let only_logical = Some(args.logical.as_str()).filter(|l| !l.is_empty());
    let plan = build_plan(ctx, platform, &ids, only_logical);
    ctx.store("identifiers_update_plan.json", &plan_artifact(&plan));
    record_index_manifest(
        &ctx.artifacts,
        &ctx.config.vectordb.base_path,
        "rag_index_manifest_update_from_app.json",
    );

    if plan.is_empty() {
        ctx.reporter.info("No mapped identifiers found to update");
        return Ok(StatusPayload::new(Status::Noop, "No mapped identifiers found to update"));
    }

    let updater = MappingUpdater::from_config(&ctx.config.mappings);
    let summary = updater.update_many(&args.tests_repo, &plan.updates)?;
    ctx.store("identifiers_update_summary.json", &summary);
    for file in &summary.changed_files {
        ctx.reporter.detail(&format!("Updated {}", file.display()));
    }

    if summary.total_updated == 0 {
        ctx.reporter.info("No identifier change detected");
        return Ok(StatusPayload::new(Status::Noop, "No identifier change detected"));
    }
    record_ledger(
        ctx,
        "update_mappings_from_app",
        &args.tests_repo,
        "applied",
        format!("{} updates in {} files", plan.updates.len(), summary.changed_files.len()),
    );

    let title = only_logical.map_or_else(
        || "Auto-heal: update identifiers from app sources".to_string(),
        |l| format!("Auto-heal: update identifiers for '{l}' from app"),
    );
    Ok(ctx
        .publish(
            &args.tests_repo,
            &args.publish,
            &title,
            "Automated update based on app source changes",
            "Updated locally (no PR)",
            "Updated locally; PR not opened",
        )
        .with("changed", summary.total_updated))
}
