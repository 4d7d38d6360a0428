//! Soul resolution: the persona/system-prompt Markdown injected first into
//! every agent turn. Resolution order is workspace-local, then the global
//! active soul, then a hardcoded fallback:
//!
//! 1. `<workspace>/.msgcode/SOUL.md`
//! 2. `~/.config/msgcode/souls/<active>.md`, where `<active>` comes from
//!    `~/.config/msgcode/souls/active.json`
//! 3. [`default_soul`]
//!
//! `list_souls` enumerates the global directory for `/soul list`;
//! `set_active_soul` writes `active.json` for `/soul use <name>`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-file size cap (characters), applied with the same 70/20/10 head-tail
/// split the Thread Journal uses for oversized turns.
const MAX_FILE_CHARS: usize = 20_000;

const ACTIVE_FILE: &str = "active.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoulSource {
    Workspace,
    Global,
    None,
}

impl SoulSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoulSource::Workspace => "workspace",
            SoulSource::Global => "global",
            SoulSource::None => "none",
        }
    }
}

impl std::fmt::Display for SoulSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ResolvedSoul {
    pub text: String,
    pub source: SoulSource,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ActiveSoul {
    active: Option<String>,
}

/// `~/.config/msgcode/souls`. Reads `HOME` directly, matching how the
/// `msgcode` binary resolves its own config directory — no `dirs` crate.
fn global_souls_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("msgcode").join("souls")
}

fn read_active(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(ACTIVE_FILE)).ok()?;
    let parsed: ActiveSoul = serde_json::from_str(&content)
        .map_err(|e| warn!(error = %e, "malformed active.json"))
        .ok()?;
    parsed.active
}

/// Resolve the soul for `workspace_path` per the order documented above.
pub fn resolve_soul(workspace_path: &Path) -> ResolvedSoul {
    let workspace_soul = workspace_path.join(".msgcode").join("SOUL.md");
    if let Some(text) = read_and_truncate(&workspace_soul) {
        return ResolvedSoul { text, source: SoulSource::Workspace, path: Some(workspace_soul) };
    }

    let souls_dir = global_souls_dir();
    if let Some(active) = read_active(&souls_dir) {
        let path = souls_dir.join(format!("{active}.md"));
        if let Some(text) = read_and_truncate(&path) {
            return ResolvedSoul { text, source: SoulSource::Global, path: Some(path) };
        }
    }

    ResolvedSoul { text: default_soul(), source: SoulSource::None, path: None }
}

/// Names (without `.md`) of every soul in the global directory, sorted.
pub fn list_souls() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(global_souls_dir()) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                return None;
            }
            path.file_stem().map(|s| s.to_string_lossy().to_string())
        })
        .collect();
    names.sort();
    names
}

/// The currently active global soul name, if `active.json` names one.
pub fn active_soul_name() -> Option<String> {
    read_active(&global_souls_dir())
}

/// Record `name` as the active global soul. Creates the souls directory if
/// it doesn't exist yet; does not check `name` exists as a file — `/soul
/// use` picks that up next turn when resolution falls through to it.
pub fn set_active_soul(name: &str) -> std::io::Result<()> {
    let dir = global_souls_dir();
    std::fs::create_dir_all(&dir)?;
    let active = ActiveSoul { active: Some(name.to_string()) };
    let json = serde_json::to_string_pretty(&active)?;
    std::fs::write(dir.join(ACTIVE_FILE), json)
}

/// Read a file and truncate to MAX_FILE_CHARS using 70/20/10 head-tail split.
fn read_and_truncate(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to read soul file");
            }
        })
        .ok()?;

    if content.is_empty() {
        return None;
    }

    Some(truncate_content(&content, MAX_FILE_CHARS))
}

/// Truncate content to `max_chars` using 70% head / 20% tail / 10% marker.
pub(crate) fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }

    let head_chars = max_chars * 70 / 100;
    let tail_chars = max_chars * 20 / 100;
    let marker = "\n\n[... content truncated ...]\n\n";

    let head_end = content[..head_chars]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(head_chars);
    let tail_start = if content.len() > tail_chars {
        content[(content.len() - tail_chars)..]
            .find('\n')
            .map(|i| content.len() - tail_chars + i + 1)
            .unwrap_or(content.len() - tail_chars)
    } else {
        0
    };

    let mut out = String::with_capacity(head_end + marker.len() + (content.len() - tail_start));
    out.push_str(&content[..head_end]);
    out.push_str(marker);
    out.push_str(&content[tail_start..]);
    out
}

/// Fallback soul content when no SOUL.md is found anywhere in the
/// resolution chain.
pub fn default_soul() -> String {
    "You are a helpful local coding and automation assistant. \
     Be concise and direct. Use the tools you're given rather than guessing."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    // `HOME` is process-global; serialize every test that touches it so
    // parallel runs don't clobber each other's souls directory.
    static HOME_LOCK: Mutex<()> = Mutex::new(());

    fn with_home<T>(home: &Path, f: impl FnOnce() -> T) -> T {
        let _guard = HOME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let prev = std::env::var("HOME").ok();
        std::env::set_var("HOME", home);
        let result = f();
        match prev {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }
        result
    }

    #[test]
    fn workspace_soul_takes_precedence() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        fs::create_dir_all(ws.path().join(".msgcode")).unwrap();
        fs::write(ws.path().join(".msgcode").join("SOUL.md"), "workspace persona").unwrap();

        let resolved = with_home(home.path(), || resolve_soul(ws.path()));
        assert_eq!(resolved.text, "workspace persona");
        assert_eq!(resolved.source, SoulSource::Workspace);
    }

    #[test]
    fn falls_back_to_active_global_soul() {
        let home = tempfile::tempdir().unwrap();
        let souls_dir = home.path().join(".config").join("msgcode").join("souls");
        fs::create_dir_all(&souls_dir).unwrap();
        fs::write(souls_dir.join("pirate.md"), "arr").unwrap();
        fs::write(souls_dir.join(ACTIVE_FILE), r#"{"active":"pirate"}"#).unwrap();
        let ws = tempfile::tempdir().unwrap();

        let resolved = with_home(home.path(), || resolve_soul(ws.path()));
        assert_eq!(resolved.text, "arr");
        assert_eq!(resolved.source, SoulSource::Global);
    }

    #[test]
    fn falls_back_to_default_when_nothing_resolves() {
        let home = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();

        let resolved = with_home(home.path(), || resolve_soul(ws.path()));
        assert_eq!(resolved.text, default_soul());
        assert_eq!(resolved.source, SoulSource::None);
        assert!(resolved.path.is_none());
    }

    #[test]
    fn list_souls_is_sorted_and_md_only() {
        let home = tempfile::tempdir().unwrap();
        let souls_dir = home.path().join(".config").join("msgcode").join("souls");
        fs::create_dir_all(&souls_dir).unwrap();
        fs::write(souls_dir.join("zeta.md"), "z").unwrap();
        fs::write(souls_dir.join("alpha.md"), "a").unwrap();
        fs::write(souls_dir.join("notes.txt"), "ignored").unwrap();

        let names = with_home(home.path(), list_souls);
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn set_active_soul_is_read_back() {
        let home = tempfile::tempdir().unwrap();
        with_home(home.path(), || {
            set_active_soul("pirate").unwrap();
            assert_eq!(active_soul_name(), Some("pirate".to_string()));
        });
    }

    #[test]
    fn truncate_preserves_small_files() {
        let content = "Hello, world!\nSecond line.";
        let result = truncate_content(content, MAX_FILE_CHARS);
        assert_eq!(result, content);
    }

    #[test]
    fn truncate_applies_70_20_split() {
        let content = (0..200).map(|i| format!("Line {i}\n")).collect::<String>();
        let result = truncate_content(&content, 200);
        assert!(result.contains("[... content truncated ...]"));
        assert!(result.len() < content.len());
    }
}
