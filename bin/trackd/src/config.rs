//! Server configuration — TOML file with storage paths, rate-limit
//! overrides, and the static workspace member roster.

use std::path::{Path, PathBuf};

use opentrack_core::{Role, StaticDirectory};
use serde::Deserialize;
use track::ratelimit::RateLimits;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Listen address; the `--listen` CLI flag overrides it.
    #[serde(default)]
    pub listen: Option<String>,

    pub storage: StorageConfig,

    /// Per-action rate-limit overrides; actions not listed keep their
    /// defaults.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Static workspace member roster.
    #[serde(default)]
    pub members: Vec<MemberEntry>,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitsConfig {
    pub create_project: Option<LimitEntry>,
    pub update_project: Option<LimitEntry>,
    pub create_task: Option<LimitEntry>,
    pub update_task: Option<LimitEntry>,
    pub delete_task: Option<LimitEntry>,
    pub create_sprint: Option<LimitEntry>,
    pub update_sprint: Option<LimitEntry>,
    pub complete_sprint: Option<LimitEntry>,
    pub delete_sprint: Option<LimitEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitEntry {
    pub max_attempts: u32,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct MemberEntry {
    pub workspace_id: String,
    pub user_id: String,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    #[default]
    Member,
}

impl ServerConfig {
    /// Resolve a context name or path to a config file path.
    /// Names go to `/etc/opentrack/<name>.toml`; anything containing
    /// `/` or `.` is used as a path directly.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(format!("/etc/opentrack/{}.toml", name_or_path))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Build the rate-limit policy table: defaults with the configured
    /// overrides applied.
    pub fn rate_limits(&self) -> RateLimits {
        let mut limits = RateLimits::default();
        apply(&mut limits.create_project, self.limits.create_project);
        apply(&mut limits.update_project, self.limits.update_project);
        apply(&mut limits.create_task, self.limits.create_task);
        apply(&mut limits.update_task, self.limits.update_task);
        apply(&mut limits.delete_task, self.limits.delete_task);
        apply(&mut limits.create_sprint, self.limits.create_sprint);
        apply(&mut limits.update_sprint, self.limits.update_sprint);
        apply(&mut limits.complete_sprint, self.limits.complete_sprint);
        apply(&mut limits.delete_sprint, self.limits.delete_sprint);
        limits
    }

    /// Build the member directory from the configured roster.
    pub fn directory(&self) -> StaticDirectory {
        let mut dir = StaticDirectory::new();
        for member in &self.members {
            let role = match member.role {
                MemberRole::Admin => Role::Admin,
                MemberRole::Member => Role::Member,
            };
            dir.insert(
                member.workspace_id.clone(),
                member.user_id.clone(),
                role,
                member.display_name.clone(),
            );
        }
        dir
    }
}

fn apply(policy: &mut track::ratelimit::RatePolicy, entry: Option<LimitEntry>) {
    if let Some(entry) = entry {
        policy.max_attempts = entry.max_attempts;
        policy.window_ms = entry.window_secs * 1000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentrack_core::Directory;

    #[test]
    fn resolve_path_name_vs_path() {
        assert_eq!(
            ServerConfig::resolve_path("prod"),
            PathBuf::from("/etc/opentrack/prod.toml")
        );
        assert_eq!(
            ServerConfig::resolve_path("./local.toml"),
            PathBuf::from("./local.toml")
        );
    }

    #[test]
    fn parse_full_config() {
        let text = r#"
            listen = "127.0.0.1:9090"

            [storage]
            data_dir = "/var/lib/opentrack"

            [limits.create_task]
            max_attempts = 5
            window_secs = 10

            [[members]]
            workspace_id = "ws1"
            user_id = "alice"
            role = "admin"
            display_name = "Alice A."

            [[members]]
            workspace_id = "ws1"
            user_id = "bob"
        "#;
        let config: ServerConfig = toml::from_str(text).unwrap();
        assert_eq!(config.listen.as_deref(), Some("127.0.0.1:9090"));
        assert_eq!(config.storage.data_dir, "/var/lib/opentrack");

        let limits = config.rate_limits();
        assert_eq!(limits.create_task.max_attempts, 5);
        assert_eq!(limits.create_task.window_ms, 10_000);
        // Untouched actions keep their defaults.
        assert_eq!(limits.delete_sprint.max_attempts, RateLimits::default().delete_sprint.max_attempts);

        let dir = config.directory();
        assert_eq!(dir.role_of("ws1", "alice").unwrap(), Some(Role::Admin));
        assert_eq!(dir.role_of("ws1", "bob").unwrap(), Some(Role::Member));
        assert_eq!(dir.display_name("ws1", "alice").as_deref(), Some("Alice A."));
    }

    #[test]
    fn minimal_config_is_enough() {
        let config: ServerConfig = toml::from_str("[storage]\ndata_dir = \"/tmp/t\"\n").unwrap();
        assert!(config.listen.is_none());
        assert!(config.members.is_empty());
        let limits = config.rate_limits();
        assert_eq!(limits.create_project.max_attempts, RateLimits::default().create_project.max_attempts);
    }
}
