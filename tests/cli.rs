use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    setup_env_with_embedding("provider = \"hash\"\ndims = 128")
}

fn setup_env_with_embedding(embedding: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/mcat.sqlite"

[catalog]
root = "{root}/catalog"

[embedding]
{embedding}

[index]
cache_path = "{root}/data/components.usearch"
default_threshold = 0.0
"#,
        root = root.display(),
        embedding = embedding
    );

    let config_path = config_dir.join("mcat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mcat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_mcat"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("failed to run mcat binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn catalog_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("catalog")
}

#[test]
fn test_init_creates_database_and_root() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_mcat(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(catalog_dir(&config).is_dir());

    let (_, _, ok) = run_mcat(&config, &["init"]);
    assert!(ok, "init should be idempotent");
}

#[test]
fn test_new_sync_validate_flow() {
    let (_tmp, config) = setup_test_env();
    run_mcat(&config, &["init"]);

    let (stdout, stderr, ok) = run_mcat(
        &config,
        &[
            "new",
            "BP-1042",
            "--category",
            "fabricated",
            "--name",
            "Steel base plate",
        ],
    );
    assert!(ok, "new failed: {}", stderr);
    assert!(stdout.contains("Created component BP-1042"));

    let dir = catalog_dir(&config).join("BP-1042");
    fs::write(dir.join("plate.dxf"), b"drawing").unwrap();
    fs::write(dir.join("plate.step"), b"model").unwrap();

    let (stdout, _, ok) = run_mcat(&config, &["sync", "--dry-run"]);
    assert!(ok);
    assert!(stdout.contains("sync (dry-run)"));
    assert!(stdout.contains("+ plate.dxf"));
    let manifest = fs::read_to_string(dir.join("component.json")).unwrap();
    assert!(!manifest.contains("plate.dxf"));

    let (stdout, stderr, ok) = run_mcat(&config, &["sync"]);
    assert!(ok, "sync failed: {}", stderr);
    assert!(stdout.contains("manifests written: 1"));

    let (stdout, _, ok) = run_mcat(&config, &["validate"]);
    assert!(ok);
    assert!(stdout.contains("result: ok"));

    fs::remove_file(dir.join("plate.dxf")).unwrap();
    let (stdout, _, ok) = run_mcat(&config, &["validate", "BP-1042"]);
    assert!(!ok, "missing drawing must fail validation");
    assert!(stdout.contains("plate.dxf: missing"));

    let (stdout, _, ok) = run_mcat(&config, &["components"]);
    assert!(ok);
    assert!(stdout.contains("BP-1042"));
    assert!(stdout.contains("1 component(s)"));
}

#[test]
fn test_search_after_vector_sync() {
    let (_tmp, config) = setup_test_env();
    run_mcat(&config, &["init"]);
    run_mcat(
        &config,
        &["new", "P1", "--identifier", "BP-1", "--name", "steel base plate"],
    );
    run_mcat(
        &config,
        &[
            "new",
            "P2",
            "--identifier",
            "BR-7",
            "--category",
            "standard",
            "--name",
            "ball bearing",
        ],
    );
    for name in ["P1", "P2"] {
        fs::write(catalog_dir(&config).join(name).join("a.dxf"), name).unwrap();
    }

    let (stdout, stderr, ok) = run_mcat(&config, &["sync", "--include-vectors"]);
    assert!(ok, "sync failed: {}", stderr);
    assert!(stdout.contains("vectors upserted: 2"));

    let (stdout, _, ok) = run_mcat(&config, &["search", "base plate", "--limit", "1"]);
    assert!(ok);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("BP-1"));

    let (stdout, _, ok) = run_mcat(&config, &["index", "stats"]);
    assert!(ok);
    assert!(stdout.contains("rows: 2"));
    assert!(stdout.contains("cache: present"));

    let (stdout, _, ok) = run_mcat(&config, &["index", "clear"]);
    assert!(ok);
    assert!(stdout.contains("rows removed: 2"));

    let (stdout, _, ok) = run_mcat(&config, &["search", "base plate"]);
    assert!(ok);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_unreadable_manifest_fails_sync() {
    let (_tmp, config) = setup_test_env();
    run_mcat(&config, &["init"]);
    let dir = catalog_dir(&config).join("BROKEN");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("component.json"), "{ not json").unwrap();

    let (stdout, _, ok) = run_mcat(&config, &["sync"]);
    assert!(!ok);
    assert!(stdout.contains("BROKEN: manifest unreadable"));
    assert_eq!(
        fs::read_to_string(dir.join("component.json")).unwrap(),
        "{ not json"
    );
}

#[test]
fn test_index_upkeep_without_provider() {
    let (_tmp, config) = setup_env_with_embedding("provider = \"disabled\"");
    run_mcat(&config, &["init"]);
    run_mcat(&config, &["new", "P1", "--name", "steel base plate"]);
    fs::write(catalog_dir(&config).join("P1").join("a.dxf"), b"x").unwrap();

    let (stdout, stderr, ok) = run_mcat(&config, &["sync"]);
    assert!(ok, "plain sync must not need a provider: {}", stderr);
    assert!(stdout.contains("manifests written: 1"));

    let (stdout, stderr, ok) = run_mcat(&config, &["index", "stats"]);
    assert!(ok, "stats failed: {}", stderr);
    assert!(stdout.contains("provider: disabled"));
    assert!(stdout.contains("rows: 0"));

    let (stdout, stderr, ok) = run_mcat(&config, &["index", "clear"]);
    assert!(ok, "clear failed: {}", stderr);
    assert!(stdout.contains("rows removed: 0"));

    let (_, _, ok) = run_mcat(&config, &["search", "plate"]);
    assert!(!ok, "search still needs a provider");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_mcat(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
