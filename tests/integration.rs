use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ctr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ctr");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("lease.txt"),
        "Commercial lease agreement between Acme Corp and Beta LLC.\n\n\
         The tenant shall pay monthly rent for the warehouse premises. \
         Either party may terminate with ninety days written notice.",
    )
    .unwrap();
    fs::write(
        files_dir.join("supply.txt"),
        "Supply agreement for industrial coffee beans.\n\n\
         The supplier delivers roasted beans every week. \
         Late delivery incurs a penalty of two percent per day.",
    )
    .unwrap();
    fs::write(files_dir.join("empty.txt"), "   \n").unwrap();

    // `hash` keeps the tests offline; the data directory does not exist yet.
    let config_content = format!(
        r#"[db]
path = "{}/data/contracts.sqlite"

[retrieval]
top_k = 2

[context]
text_chars = 80

[embedding]
provider = "hash"
dims = 64
"#,
        root.display()
    );

    let config_path = config_dir.join("ctr.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ctr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn file_arg(config_path: &Path, name: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("files").join(name).to_str().unwrap().to_string()
}

/// Ingest a file and return the printed contract id.
fn ingest(config_path: &Path, name: &str, extra: &[&str]) -> String {
    let file = file_arg(config_path, name);
    let mut args = vec!["ingest", file.as_str()];
    args.extend_from_slice(extra);
    let (stdout, stderr, success) = run_ctr(config_path, &args);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    stdout.trim().to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctr(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ctr(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ctr(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_prints_contract_id() {
    let (_tmp, config_path) = setup_test_env();

    let id = ingest(&config_path, "lease.txt", &[]);
    assert!(id.starts_with("contract_"), "unexpected id: {}", id);
    assert_eq!(id.split('_').count(), 4);
}

#[test]
fn test_ingest_rejects_empty_file() {
    let (_tmp, config_path) = setup_test_env();

    let file = file_arg(&config_path, "empty.txt");
    let (_, stderr, success) = run_ctr(&config_path, &["ingest", &file]);
    assert!(!success);
    assert!(stderr.contains("contains no text"));
}

#[test]
fn test_ingest_rejects_non_object_fields() {
    let (_tmp, config_path) = setup_test_env();

    let file = file_arg(&config_path, "lease.txt");
    let (_, stderr, success) =
        run_ctr(&config_path, &["ingest", &file, "--fields", "[\"Acme\"]"]);
    assert!(!success);
    assert!(stderr.contains("JSON object"));
}

#[test]
fn test_list_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_ctr(&config_path, &["init"]);
    let (stdout, _, success) = run_ctr(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("No contracts stored."));
}

#[test]
fn test_list_in_insertion_order() {
    let (_tmp, config_path) = setup_test_env();

    let first = ingest(&config_path, "lease.txt", &[]);
    let second = ingest(&config_path, "supply.txt", &[]);

    let (stdout, _, success) = run_ctr(&config_path, &["list"]);
    assert!(success);
    let first_pos = stdout.find(&first).unwrap();
    let second_pos = stdout.find(&second).unwrap();
    assert!(first_pos < second_pos);
    assert!(stdout.contains("File:    lease.txt"));
    assert!(stdout.contains("2 contract(s)"));
}

#[test]
fn test_get_restores_structured_fields() {
    let (_tmp, config_path) = setup_test_env();

    let id = ingest(
        &config_path,
        "lease.txt",
        &[
            "--fields",
            r#"{"parties": ["Acme Corp", "Beta LLC"], "total_amount": 1200, "notes": null}"#,
            "--confidence",
            "0.9",
        ],
    );

    let (stdout, stderr, success) = run_ctr(&config_path, &["get", &id]);
    assert!(success, "get failed: stderr={}", stderr);
    assert!(stdout.contains(&id));
    assert!(stdout.contains(r#""parties":["Acme Corp","Beta LLC"]"#));
    assert!(stdout.contains(r#""total_amount":1200"#));
    assert!(stdout.contains(r#""source_file":"lease.txt""#));
    assert!(!stdout.contains("notes"));
    assert!(stdout.contains("confidence:   0.90"));
    assert!(stdout.contains("ninety days written notice"));
}

#[test]
fn test_get_missing_contract() {
    let (_tmp, config_path) = setup_test_env();

    run_ctr(&config_path, &["init"]);
    let (_, stderr, success) = run_ctr(&config_path, &["get", "contract_missing"]);
    assert!(!success);
    assert!(stderr.contains("contract not found"));
}

#[test]
fn test_search_ranks_exact_text_first() {
    let (_tmp, config_path) = setup_test_env();

    let lease = ingest(&config_path, "lease.txt", &[]);
    ingest(&config_path, "supply.txt", &[]);

    let lease_text = fs::read_to_string(file_arg(&config_path, "lease.txt")).unwrap();
    let (stdout, stderr, success) = run_ctr(&config_path, &["search", &lease_text]);
    assert!(success, "search failed: stderr={}", stderr);

    let first_line = stdout.lines().next().unwrap();
    assert!(first_line.starts_with("1. [1.00]"), "got: {}", first_line);
    assert!(first_line.contains(&lease));
}

#[test]
fn test_search_respects_k() {
    let (_tmp, config_path) = setup_test_env();

    ingest(&config_path, "lease.txt", &[]);
    ingest(&config_path, "supply.txt", &[]);

    let (stdout, _, success) = run_ctr(&config_path, &["search", "agreement", "--k", "1"]);
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_ctr(&config_path, &["init"]);
    let (stdout, _, success) = run_ctr(&config_path, &["search", "rent"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_context_blocks() {
    let (_tmp, config_path) = setup_test_env();

    let id = ingest(
        &config_path,
        "lease.txt",
        &["--fields", r#"{"parties": ["Acme Corp", "Beta LLC"]}"#],
    );

    let (stdout, stderr, success) = run_ctr(&config_path, &["context", "warehouse rent"]);
    assert!(success, "context failed: stderr={}", stderr);
    assert!(stdout.contains(&format!("CONTRACT ID: {}", id)));
    assert!(stdout.contains("RELEVANCE: "));
    assert!(stdout.contains("- Parties: Acme Corp, Beta LLC"));
    assert!(stdout.contains("- End: N/A"));
    assert!(stdout.contains("FULL TEXT (first 80 chars):"));
    assert!(!stdout.contains("ninety days"));
}

#[test]
fn test_context_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_ctr(&config_path, &["init"]);
    let (stdout, _, success) = run_ctr(&config_path, &["context", "who pays rent?"]);
    assert!(success);
    assert!(stdout.contains("No relevant contracts were found"));
}

#[test]
fn test_delete_removes_contract() {
    let (_tmp, config_path) = setup_test_env();

    let id = ingest(&config_path, "lease.txt", &[]);

    let (stdout, _, success) = run_ctr(&config_path, &["delete", &id]);
    assert!(success);
    assert!(stdout.contains("Deleted"));

    let (_, _, found) = run_ctr(&config_path, &["get", &id]);
    assert!(!found);

    let (_, stderr, again) = run_ctr(&config_path, &["delete", &id]);
    assert!(!again);
    assert!(stderr.contains("contract not found"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();

    ingest(&config_path, "lease.txt", &["--confidence", "0.5"]);
    ingest(&config_path, "supply.txt", &["--fields", r#"{"contract_type": "supply"}"#]);

    let (stdout, _, success) = run_ctr(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Contracts:   2"));
    assert!(stdout.contains("Model:       hash-64 (64 dims)"));
    assert!(stdout.contains("No fields:   1 / 2"));
}

#[test]
fn test_export_import_roundtrip() {
    let (tmp, config_path) = setup_test_env();

    let id = ingest(
        &config_path,
        "lease.txt",
        &[
            "--fields",
            r#"{"parties": ["Acme Corp"], "key_clauses": {"term": "12 months"}, "note": "[\"draft\"]"}"#,
        ],
    );

    let export_path = tmp.path().join("backup").join("contracts.jsonl");
    let (_, stderr, success) = run_ctr(
        &config_path,
        &["export", "--output", export_path.to_str().unwrap()],
    );
    assert!(success, "export failed: stderr={}", stderr);

    let exported = fs::read_to_string(&export_path).unwrap();
    assert_eq!(exported.lines().count(), 1);
    assert!(exported.contains(r#""parties":"[\"Acme Corp\"]""#));

    // Importing into the same store skips the existing id.
    let (stdout, _, success) = run_ctr(
        &config_path,
        &["import", export_path.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("Imported 0 contracts (1 skipped)"));

    run_ctr(&config_path, &["delete", &id]);
    let (stdout, stderr, success) = run_ctr(
        &config_path,
        &["import", export_path.to_str().unwrap()],
    );
    assert!(success, "import failed: stderr={}", stderr);
    assert!(stdout.contains("Imported 1 contracts (0 skipped)"));

    let (stdout, _, success) = run_ctr(&config_path, &["get", &id]);
    assert!(success);
    assert!(stdout.contains(r#""parties":["Acme Corp"]"#));
    assert!(stdout.contains(r#""key_clauses":{"term":"12 months"}"#));
    assert!(stdout.contains(r#""note":"[\"draft\"]""#));
}

#[test]
fn test_import_rejects_other_dimensions() {
    let (tmp, config_path) = setup_test_env();

    run_ctr(&config_path, &["init"]);
    let import_path = tmp.path().join("foreign.jsonl");
    fs::write(
        &import_path,
        r#"{"id":"contract_x","document":"text","embedding":[1.0,0.0],"metadata":{},"ingested_at":"2026-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let (_, stderr, success) = run_ctr(&config_path, &["import", import_path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("another embedding model"));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();

    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[db]\npath = \"x.sqlite\"\n\n[store]\ndistance = \"l2\"\n").unwrap();
    let (_, stderr, success) = run_ctr(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Only cosine is supported"));
}
