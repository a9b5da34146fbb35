//! Skill artifact synchronization
//!
//! One pass renders every (backend, tool) artifact, hashes the full set,
//! writes what is missing or stale, prunes what no longer belongs, and keeps
//! the presentation symlinks pointing at the canonical directories. The lock
//! file short-circuits redundant regeneration and doubles as the
//! reload-required signal for callers.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::catalog::gather_tools;
use crate::config::BackendConfig;
use crate::error::McpError;
use crate::manager::McpManager;
use crate::skill::{backend_slug, render_skill, skill_slug, SKILL_FILENAME};
use crate::types::ToolSchema;

/// Default lock filename next to the output directories.
pub const LOCK_FILENAME: &str = "mcp_settings.lock";

/// Persisted change-detection cache; never a configuration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLock {
    /// Canonical hash of the full artifact set
    pub hash: String,
    /// Resolved port, in network-server deployments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// One rendered artifact awaiting write
#[derive(Debug, Clone)]
pub struct SkillEntry {
    /// Tool name (primary hash sort key)
    pub name: String,
    /// Full path of the artifact file
    pub path: PathBuf,
    /// Rendered descriptor text
    pub content: String,
}

/// Inputs of one sync pass
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Canonical artifact directory
    pub output_root: PathBuf,
    /// Visible skills directory holding the symlinks
    pub skills_dir: PathBuf,
    /// Lock file location
    pub lock_path: PathBuf,
    /// Rewrite every artifact regardless of hash and existence
    pub force_refresh: bool,
    /// Resolved server port to record in the lock
    pub port: Option<u16>,
    /// Description overrides keyed by artifact slug
    pub description_overrides: HashMap<String, String>,
}

impl SyncOptions {
    pub fn new(output_root: PathBuf, skills_dir: PathBuf, lock_path: PathBuf) -> Self {
        Self {
            output_root,
            skills_dir,
            lock_path,
            force_refresh: false,
            port: None,
            description_overrides: HashMap::new(),
        }
    }
}

/// Result of one sync pass
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Canonical hash of the rendered artifact set
    pub hash: String,
    /// Whether the lock was rewritten, which is the reload-required signal
    pub lock_changed: bool,
}

/// Read the lock file; missing or unreadable locks count as absent.
pub fn load_lock(path: &Path) -> Option<SyncLock> {
    if !path.exists() {
        return None;
    }
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(lock) => Some(lock),
        Err(_) => {
            warn!(path = %path.display(), "Ignoring unreadable sync lock");
            None
        }
    }
}

/// Persist the lock file.
pub fn write_lock(path: &Path, lock: &SyncLock) -> Result<(), McpError> {
    let text = serde_json::to_string_pretty(lock)
        .map_err(|e| McpError::Protocol(format!("JSON error: {e}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Render one entry per (backend, tool) pair, sorted by backend id then
/// tool name.
pub fn build_skill_entries(
    output_root: &Path,
    tools_by_backend: &BTreeMap<String, Vec<ToolSchema>>,
    overrides: &HashMap<String, String>,
) -> Result<Vec<SkillEntry>, McpError> {
    let mut entries = Vec::new();
    for (backend_id, tools) in tools_by_backend {
        let mut tools: Vec<&ToolSchema> = tools.iter().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        for tool in tools {
            let slug = skill_slug(backend_id, &tool.name)?;
            let description_override = overrides.get(&slug).map(String::as_str);
            entries.push(SkillEntry {
                name: tool.name.clone(),
                path: output_root.join(&slug).join(SKILL_FILENAME),
                content: render_skill(tool, backend_id, description_override)?,
            });
        }
    }
    Ok(entries)
}

/// Canonical hash over the sorted (name, relative-path, content) triples.
///
/// The payload is a JSON array of objects; serde_json serializes object keys
/// in sorted order, so the byte stream is stable regardless of iteration
/// order or platform locale.
pub fn compute_skills_hash(entries: &[SkillEntry], base_dir: &Path) -> Result<String, McpError> {
    let mut sorted: Vec<&SkillEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| (&a.name, &a.path).cmp(&(&b.name, &b.path)));

    let payload: Vec<serde_json::Value> = sorted
        .iter()
        .map(|entry| {
            let path = entry.path.strip_prefix(base_dir).unwrap_or(&entry.path);
            serde_json::json!({
                "name": entry.name,
                "path": path.to_string_lossy(),
                "content": entry.content,
            })
        })
        .collect();

    let raw = serde_json::to_vec(&payload)
        .map_err(|e| McpError::Protocol(format!("JSON error: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(&raw);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write artifacts according to the write policy.
///
/// A directory that already exists is skipped unless `refresh` is set; the
/// check is per directory, so a partial directory is never topped up on a
/// non-refresh pass.
pub fn write_skills(entries: &[SkillEntry], refresh: bool) -> Result<(), McpError> {
    for entry in entries {
        let Some(dir) = entry.path.parent() else {
            continue;
        };
        if dir.exists() && !refresh {
            continue;
        }
        std::fs::create_dir_all(dir)?;
        std::fs::write(&entry.path, &entry.content)?;
    }
    Ok(())
}

/// Expected artifact directory names per backend.
pub fn expected_names(
    tools_by_backend: &BTreeMap<String, Vec<ToolSchema>>,
) -> Result<BTreeMap<String, BTreeSet<String>>, McpError> {
    let mut expected = BTreeMap::new();
    for (backend_id, tools) in tools_by_backend {
        let names = tools
            .iter()
            .map(|tool| skill_slug(backend_id, &tool.name))
            .collect::<Result<BTreeSet<_>, _>>()?;
        expected.insert(backend_id.clone(), names);
    }
    Ok(expected)
}

fn artifact_dirs(output_root: &Path) -> Result<Vec<(PathBuf, String)>, McpError> {
    let mut dirs = Vec::new();
    if !output_root.exists() {
        return Ok(dirs);
    }
    for entry in std::fs::read_dir(output_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push((entry.path(), entry.file_name().to_string_lossy().into_owned()));
        }
    }
    dirs.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(dirs)
}

/// Delete artifact directories that no longer belong.
///
/// For each backend in `expected`, slug-prefixed directories outside its
/// expected-name set go away; every slug-prefixed directory of a disabled
/// backend goes away regardless of name.
pub fn prune_skills(
    output_root: &Path,
    expected: &BTreeMap<String, BTreeSet<String>>,
    disabled_backends: &[String],
) -> Result<(), McpError> {
    for (backend_id, names) in expected {
        let prefix = format!("{}-", backend_slug(backend_id)?);
        for (path, name) in artifact_dirs(output_root)? {
            if name.starts_with(&prefix) && !names.contains(&name) {
                info!(dir = %path.display(), "Pruning stale skill artifact");
                std::fs::remove_dir_all(&path)?;
            }
        }
    }
    for backend_id in disabled_backends {
        // An id that does not slug cannot own any artifacts.
        let Ok(slug) = backend_slug(backend_id) else {
            continue;
        };
        let prefix = format!("{slug}-");
        for (path, name) in artifact_dirs(output_root)? {
            if name.starts_with(&prefix) {
                info!(dir = %path.display(), "Pruning artifact of disabled backend");
                std::fs::remove_dir_all(&path)?;
            }
        }
    }
    Ok(())
}

/// Maintain the presentation symlinks.
///
/// One relative symlink per expected artifact; correct links are left
/// untouched, wrong links and plain-file collisions are replaced, other
/// collisions stay with a warning. Symlinks for no-longer-expected names and
/// for disabled backends are removed; nothing that is not a symlink is ever
/// deleted here.
pub fn manage_symlinks(
    output_root: &Path,
    skills_dir: &Path,
    expected: &BTreeMap<String, BTreeSet<String>>,
    disabled_backends: &[String],
) -> Result<(), McpError> {
    std::fs::create_dir_all(skills_dir)?;
    std::fs::create_dir_all(output_root)?;
    let skills_abs = std::fs::canonicalize(skills_dir)?;
    let output_abs = std::fs::canonicalize(output_root)?;
    let target_base = relative_path(&skills_abs, &output_abs);

    for names in expected.values() {
        for name in names {
            let link_path = skills_dir.join(name);
            let target = target_base.join(name);
            match std::fs::symlink_metadata(&link_path) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    let correct = std::fs::read_link(&link_path)
                        .map(|existing| existing == target)
                        .unwrap_or(false);
                    if correct {
                        continue;
                    }
                    std::fs::remove_file(&link_path)?;
                }
                Ok(meta) if meta.is_file() => {
                    std::fs::remove_file(&link_path)?;
                }
                Ok(_) => {
                    warn!(
                        path = %link_path.display(),
                        "Skill name collides with a non-symlink; leaving it in place"
                    );
                    continue;
                }
                Err(_) => {}
            }
            create_symlink(&target, &link_path)?;
            debug!(link = %link_path.display(), target = %target.display(), "Created skill symlink");
        }
    }

    for (backend_id, names) in expected {
        let prefix = format!("{}-", backend_slug(backend_id)?);
        remove_stale_links(skills_dir, &prefix, Some(names))?;
    }
    for backend_id in disabled_backends {
        let Ok(slug) = backend_slug(backend_id) else {
            continue;
        };
        remove_stale_links(skills_dir, &format!("{slug}-"), None)?;
    }
    Ok(())
}

fn remove_stale_links(
    skills_dir: &Path,
    prefix: &str,
    keep: Option<&BTreeSet<String>>,
) -> Result<(), McpError> {
    for entry in std::fs::read_dir(skills_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) {
            continue;
        }
        if keep.map(|names| names.contains(&name)).unwrap_or(false) {
            continue;
        }
        if std::fs::symlink_metadata(entry.path())?.file_type().is_symlink() {
            debug!(link = %entry.path().display(), "Removing stale skill symlink");
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), McpError> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, link: &Path) -> Result<(), McpError> {
    warn!(path = %link.display(), "Symlinks unsupported on this platform; skipping");
    Ok(())
}

/// Relative path from `from` to `to`; both must be absolute.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for comp in &to[common..] {
        rel.push(comp);
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

/// One sync pass over an already-gathered catalog.
///
/// Separated from [`sync`] so the filesystem behavior is drivable without
/// live backends.
pub fn sync_catalog(
    tools_by_backend: &BTreeMap<String, Vec<ToolSchema>>,
    configs: &[BackendConfig],
    opts: &SyncOptions,
) -> Result<SyncOutcome, McpError> {
    let entries =
        build_skill_entries(&opts.output_root, tools_by_backend, &opts.description_overrides)?;
    let hash = compute_skills_hash(&entries, &opts.output_root)?;

    let previous = load_lock(&opts.lock_path);
    let hash_changed = previous.as_ref().map(|l| l.hash != hash).unwrap_or(true);

    std::fs::create_dir_all(&opts.output_root)?;
    write_skills(&entries, opts.force_refresh || hash_changed)?;

    let expected = expected_names(tools_by_backend)?;
    let disabled: Vec<String> = configs
        .iter()
        .filter(|c| !c.is_enabled())
        .map(|c| c.id.clone())
        .collect();
    prune_skills(&opts.output_root, &expected, &disabled)?;
    manage_symlinks(&opts.output_root, &opts.skills_dir, &expected, &disabled)?;

    let lock = SyncLock {
        hash: hash.clone(),
        port: opts.port,
    };
    let lock_changed = previous.as_ref() != Some(&lock);
    if lock_changed {
        write_lock(&opts.lock_path, &lock)?;
    }

    info!(hash = %hash, lock_changed, "Skill sync pass complete");
    Ok(SyncOutcome { hash, lock_changed })
}

/// Full sync pass: discovery, then [`sync_catalog`].
///
/// Backends whose discovery failed are absent from the catalog and therefore
/// exempt from pruning and symlink retirement this pass; a transient outage
/// never reads as an emptied tool set.
pub async fn sync(
    manager: &McpManager,
    configs: &[BackendConfig],
    opts: &SyncOptions,
) -> Result<SyncOutcome, McpError> {
    let enabled: Vec<String> = configs
        .iter()
        .filter(|c| c.is_enabled())
        .map(|c| c.id.clone())
        .collect();
    let tools_by_backend = gather_tools(manager, &enabled).await;
    sync_catalog(&tools_by_backend, configs, opts)
}
