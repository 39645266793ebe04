use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use objval_core::tools::fakes::ScriptedTool;
use objval_core::tools::ToolOutput;
use objval_core::{
    Args, CancelToken, HashAlgorithm, JobOptions, LogLevel, ModuleCatalog, PluginConfig,
    PluginRegistry, ValidationContext, ValidationJob, Verdict,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const APP_INFO: &str = r#"{"jhove": {"release": "1.28.0", "app": {"modules": [
    {"module": "TEXT-hul", "release": "1.0"}]}}}"#;

fn fake_jhove() -> Arc<ScriptedTool> {
    Arc::new(ScriptedTool::new("jhove", |args| {
        if args.len() <= 2 {
            return Ok(ToolOutput::ok(APP_INFO));
        }
        let file = args[args.len() - 1].clone();
        let report = json!({"jhove": {"repInfo": [{
            "uri": file,
            "status": "Well-Formed and valid",
            "reportingModule": {"name": "TEXT-hul"},
            "messages": [],
        }]}});
        Ok(ToolOutput::ok(report.to_string()))
    }))
}

fn registry() -> PluginRegistry {
    PluginRegistry::with_tools(
        fake_jhove(),
        Arc::new(ScriptedTool::stdout("fido", "text/plain ")),
        4096,
    )
}

fn kwargs(id: &str, args: serde_json::Value) -> BTreeMap<String, Args> {
    BTreeMap::from([(id.to_string(), args.as_object().cloned().expect("object"))])
}

fn make_bag(root: &Path) {
    fs::create_dir_all(root.join("data")).expect("mkdir");
    fs::write(root.join("bagit.txt"), "BagIt-Version: 1.0\n").expect("write");
    fs::write(root.join("data/notes.txt"), "notes\n").expect("write");
    let md5 = |p: &Path| HashAlgorithm::Md5.hash_file(p).expect("hash");
    fs::write(
        root.join("manifest-md5.txt"),
        format!("{}  data/notes.txt\n", md5(&root.join("data/notes.txt"))),
    )
    .expect("write");
    fs::write(
        root.join("tagmanifest-md5.txt"),
        format!(
            "{}  bagit.txt\n{}  manifest-md5.txt\n",
            md5(&root.join("bagit.txt")),
            md5(&root.join("manifest-md5.txt"))
        ),
    )
    .expect("write");
}

// ---------------------------------------------------------------------------
// Module-list jobs
// ---------------------------------------------------------------------------

#[test]
fn object_job_is_valid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("a.txt");
    fs::write(&file, "hello\n").expect("write");

    let catalog = ModuleCatalog::standard(&registry()).expect("catalog");
    let plan = catalog.select(
        ValidationContext::Object,
        None,
        &kwargs("file_integrity", json!({"value": "b1946ac92492d2347c6235b4d2611184"})),
    );
    let mut pushed = Vec::new();
    let report = ValidationJob::new(&file, plan).run(&mut |p| pushed.push(p.to_string()));

    assert_eq!(report.verdict(), Verdict::Valid, "{:?}", report.log);
    let modules: Vec<_> = report.data.details.keys().map(String::as_str).collect();
    assert_eq!(modules, vec!["file_format", "file_integrity"]);
    assert_eq!(report.log.last(LogLevel::Info), Some("Target is valid."));
    assert!(pushed.iter().any(|p| p.starts_with("processing '")));
}

#[test]
fn object_job_with_bad_checksum_is_invalid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("a.txt");
    fs::write(&file, "tampered\n").expect("write");

    let catalog = ModuleCatalog::standard(&registry()).expect("catalog");
    let requested = vec!["file_integrity".to_string()];
    let plan = catalog.select(
        ValidationContext::Object,
        Some(requested.as_slice()),
        &kwargs("file_integrity", json!({"value": "b1946ac92492d2347c6235b4d2611184"})),
    );
    let report = ValidationJob::new(&file, plan).run_detached();
    assert_eq!(report.verdict(), Verdict::Invalid);
    assert_eq!(
        report.log.last(LogLevel::Error),
        Some("Target is invalid (got 1 error(s)).")
    );
}

#[test]
fn ip_job_checks_bag_and_payload_formats() {
    let dir = tempfile::tempdir().expect("tempdir");
    make_bag(dir.path());

    let catalog = ModuleCatalog::standard(&registry()).expect("catalog");
    let plan = catalog.select(ValidationContext::Ip, None, &BTreeMap::new());
    let report = ValidationJob::new(dir.path(), plan).run_detached();

    assert_eq!(report.verdict(), Verdict::Valid, "{:?}", report.log);
    assert_eq!(report.data.details["payload_integrity"].record_count(), 3);
    assert_eq!(report.data.details["file_format"].record_count(), 1);
}

#[test]
fn disallowed_module_makes_job_incomplete() {
    let dir = tempfile::tempdir().expect("tempdir");
    make_bag(dir.path());

    let catalog = ModuleCatalog::standard(&registry()).expect("catalog");
    let requested = vec!["payload_integrity".to_string(), "file_integrity".to_string()];
    let plan = catalog.select(ValidationContext::Ip, Some(requested.as_slice()), &BTreeMap::new());
    let report = ValidationJob::new(dir.path(), plan).run_detached();

    assert_eq!(report.verdict(), Verdict::Incomplete);
    assert!(report.data.details.contains_key("payload_integrity"));
    let value = serde_json::to_value(&report).expect("serialize");
    assert!(value["data"].get("valid").is_none());
    assert_eq!(value["data"]["success"], false);
}

#[test]
fn empty_selection_uses_caller_policy() {
    let catalog = ModuleCatalog::standard(&registry()).expect("catalog");
    let plan = catalog.select(ValidationContext::Object, Some(&[][..]), &BTreeMap::new());
    let report = ValidationJob::new("anything", plan)
        .with_options(JobOptions {
            empty_plan_valid: true,
        })
        .run_detached();
    assert_eq!(report.verdict(), Verdict::Valid);
}

#[test]
fn cancelled_job_reports_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    make_bag(dir.path());
    let catalog = ModuleCatalog::standard(&registry()).expect("catalog");
    let plan = catalog.select(ValidationContext::Ip, None, &BTreeMap::new());

    let cancel = CancelToken::new();
    let job = ValidationJob::new(dir.path(), plan).with_cancel_token(cancel.clone());
    // cancel as soon as the first record is processed
    let report = job.run(&mut |progress| {
        if progress.starts_with("processing") {
            cancel.cancel();
        }
    });
    assert!(!report.data.success);
    assert_eq!(report.verdict(), Verdict::Incomplete);
    assert!(report
        .log
        .messages(LogLevel::Error)
        .iter()
        .any(|m| m.body.starts_with("Validation cancelled before")));
}

// ---------------------------------------------------------------------------
// Plugin-config jobs
// ---------------------------------------------------------------------------

#[test]
fn plugin_config_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    make_bag(dir.path());

    let request = PluginConfig::parse_map(&json!({
        "bag": {"plugin": "integrity-bagit", "args": {"method": "md5"}},
        "formats": {"plugin": "jhove-fido-mimetype-bagit"},
        "ghost": {"plugin": "no-such-plugin"}
    }))
    .expect("request");
    let plan = registry().plan(&request);
    assert_eq!(plan.module_ids(), vec!["bag", "formats"]);

    let report = ValidationJob::new(dir.path(), plan).run_detached();
    assert_eq!(report.verdict(), Verdict::Incomplete);
    assert_eq!(report.data.details["bag"].valid, Some(true));
    assert_eq!(report.data.details["formats"].valid, Some(true));
    assert!(report
        .log
        .messages(LogLevel::Error)
        .iter()
        .any(|m| m.body == "Module Selector: Unknown or unavailable plugin 'no-such-plugin'."));
}
