//! Filesystem behavior of the skill sync engine.
//!
//! Drives `sync_catalog` against temp directories with fixed catalogs, so no
//! live backends are involved.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use skillbridge::config::BackendConfig;
use skillbridge::sync::{load_lock, sync_catalog, SyncOptions};
use skillbridge::types::ToolSchema;

fn tool(name: &str) -> ToolSchema {
    ToolSchema {
        name: name.into(),
        description: format!("Does {name}"),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {"input": {"type": "string"}}
        }),
    }
}

fn catalog(backends: &[(&str, &[&str])]) -> BTreeMap<String, Vec<ToolSchema>> {
    backends
        .iter()
        .map(|(id, tools)| (id.to_string(), tools.iter().map(|t| tool(t)).collect()))
        .collect()
}

fn enabled(id: &str) -> BackendConfig {
    BackendConfig {
        id: id.into(),
        command: Some("unused".into()),
        ..Default::default()
    }
}

fn disabled(id: &str) -> BackendConfig {
    BackendConfig {
        disabled: true,
        ..enabled(id)
    }
}

fn options(root: &Path) -> SyncOptions {
    SyncOptions::new(
        root.join("mcp-skills"),
        root.join("skills"),
        root.join("mcp_settings.lock"),
    )
}

fn skill_file(opts: &SyncOptions, dir_name: &str) -> PathBuf {
    opts.output_root.join(dir_name).join("SKILL.md")
}

fn link(opts: &SyncOptions, dir_name: &str) -> PathBuf {
    opts.skills_dir.join(dir_name)
}

#[test]
fn rerunning_an_unchanged_catalog_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = options(tmp.path());
    let tools = catalog(&[("alpha", &["run"])]);
    let configs = vec![enabled("alpha")];

    let first = sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(first.lock_changed, "first pass must write the lock");
    let content_a = std::fs::read_to_string(skill_file(&opts, "alpha-run")).unwrap();

    let second = sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(!second.lock_changed, "unchanged catalog must not touch the lock");
    assert_eq!(first.hash, second.hash);

    let content_b = std::fs::read_to_string(skill_file(&opts, "alpha-run")).unwrap();
    assert_eq!(content_a, content_b, "artifacts must be byte-identical");
}

#[test]
fn shrinking_a_tool_set_prunes_only_the_departed_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = options(tmp.path());
    let configs = vec![enabled("alpha")];

    sync_catalog(&catalog(&[("alpha", &["a", "b"])]), &configs, &opts).unwrap();
    assert!(skill_file(&opts, "alpha-a").exists());
    assert!(skill_file(&opts, "alpha-b").exists());
    assert!(link(&opts, "alpha-a").is_symlink());

    let survivor_target = std::fs::read_link(link(&opts, "alpha-a")).unwrap();

    sync_catalog(&catalog(&[("alpha", &["a"])]), &configs, &opts).unwrap();
    assert!(skill_file(&opts, "alpha-a").exists(), "kept tool survives");
    assert!(!opts.output_root.join("alpha-b").exists(), "departed tool pruned");
    assert!(!link(&opts, "alpha-b").exists(), "departed symlink removed");
    assert_eq!(
        std::fs::read_link(link(&opts, "alpha-a")).unwrap(),
        survivor_target,
        "surviving symlink untouched"
    );
}

#[test]
fn disabling_a_backend_removes_artifacts_and_reenabling_restores_them() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = options(tmp.path());

    sync_catalog(
        &catalog(&[("alpha", &["run"])]),
        &[enabled("alpha")],
        &opts,
    )
    .unwrap();
    assert!(skill_file(&opts, "alpha-run").exists());
    assert!(link(&opts, "alpha-run").is_symlink());

    // Disabled backends contribute no catalog but are pruned by config.
    sync_catalog(&catalog(&[]), &[disabled("alpha")], &opts).unwrap();
    assert!(!opts.output_root.join("alpha-run").exists());
    assert!(!link(&opts, "alpha-run").exists());

    sync_catalog(
        &catalog(&[("alpha", &["run"])]),
        &[enabled("alpha")],
        &opts,
    )
    .unwrap();
    assert!(skill_file(&opts, "alpha-run").exists());
    assert!(link(&opts, "alpha-run").is_symlink());
}

#[test]
fn existing_partial_directory_is_not_topped_up_without_refresh() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = options(tmp.path());
    let tools = catalog(&[("alpha", &["run"])]);
    let configs = vec![enabled("alpha")];

    sync_catalog(&tools, &configs, &opts).unwrap();
    std::fs::remove_file(skill_file(&opts, "alpha-run")).unwrap();

    // Hash matches the lock and the directory exists, so nothing is written.
    sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(!skill_file(&opts, "alpha-run").exists());

    let mut forced = opts.clone();
    forced.force_refresh = true;
    sync_catalog(&tools, &configs, &forced).unwrap();
    assert!(skill_file(&opts, "alpha-run").exists());
}

#[test]
fn wrong_symlink_is_replaced_and_directory_collision_is_left() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = options(tmp.path());
    let configs = vec![enabled("alpha")];
    let tools = catalog(&[("alpha", &["a", "b"])]);

    std::fs::create_dir_all(&opts.skills_dir).unwrap();
    std::os::unix::fs::symlink("/nowhere", link(&opts, "alpha-a")).unwrap();
    std::fs::create_dir_all(link(&opts, "alpha-b")).unwrap();

    sync_catalog(&tools, &configs, &opts).unwrap();

    let target = std::fs::read_link(link(&opts, "alpha-a")).unwrap();
    assert_eq!(target, PathBuf::from("../mcp-skills/alpha-a"));
    assert!(
        link(&opts, "alpha-b").is_dir() && !link(&opts, "alpha-b").is_symlink(),
        "non-symlink collision must be left in place"
    );
}

#[test]
fn plain_file_collision_is_replaced_by_the_symlink() {
    let tmp = tempfile::tempdir().unwrap();
    let opts = options(tmp.path());
    let configs = vec![enabled("alpha")];
    let tools = catalog(&[("alpha", &["a"])]);

    std::fs::create_dir_all(&opts.skills_dir).unwrap();
    std::fs::write(link(&opts, "alpha-a"), "stray file").unwrap();

    sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(link(&opts, "alpha-a").is_symlink());
}

#[test]
fn lock_records_the_port_and_rewrites_only_on_change() {
    let tmp = tempfile::tempdir().unwrap();
    let mut opts = options(tmp.path());
    opts.port = Some(28080);
    let tools = catalog(&[("alpha", &["run"])]);
    let configs = vec![enabled("alpha")];

    let first = sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(first.lock_changed);
    let lock = load_lock(&opts.lock_path).unwrap();
    assert_eq!(lock.port, Some(28080));

    let second = sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(!second.lock_changed, "same hash and port leave the lock alone");

    opts.port = Some(28081);
    let third = sync_catalog(&tools, &configs, &opts).unwrap();
    assert!(third.lock_changed, "a new port is a lock change");
    assert_eq!(load_lock(&opts.lock_path).unwrap().port, Some(28081));
}

#[test]
fn hash_is_independent_of_backend_iteration_order() {
    let tmp_a = tempfile::tempdir().unwrap();
    let tmp_b = tempfile::tempdir().unwrap();
    let opts_a = options(tmp_a.path());
    let opts_b = options(tmp_b.path());

    // Same logical catalog assembled in opposite insertion orders.
    let mut forward = BTreeMap::new();
    forward.insert("alpha".to_string(), vec![tool("x")]);
    forward.insert("beta".to_string(), vec![tool("y")]);
    let mut reverse = BTreeMap::new();
    reverse.insert("beta".to_string(), vec![tool("y")]);
    reverse.insert("alpha".to_string(), vec![tool("x")]);

    let configs = vec![enabled("alpha"), enabled("beta")];
    let a = sync_catalog(&forward, &configs, &opts_a).unwrap();
    let b = sync_catalog(&reverse, &configs, &opts_b).unwrap();
    assert_eq!(a.hash, b.hash);
}

#[test]
fn overrides_replace_the_advertised_description() {
    let tmp = tempfile::tempdir().unwrap();
    let mut opts = options(tmp.path());
    opts.description_overrides
        .insert("alpha-run".to_string(), "Curated description".to_string());

    sync_catalog(
        &catalog(&[("alpha", &["run"])]),
        &[enabled("alpha")],
        &opts,
    )
    .unwrap();

    let content = std::fs::read_to_string(skill_file(&opts, "alpha-run")).unwrap();
    assert!(content.contains("Curated description"));
    assert!(!content.contains("Does run"));
}
