pub mod home_dir {
    use anyhow::{anyhow, Context, Result};
    use std::env;
    use std::path::PathBuf;

    /// Resolve a configured home directory into an absolute path, expanding a
    /// leading `~` against the platform home, falling back to a per-platform
    /// default subdirectory when `configured` is `None`. Optionally creates
    /// the directory (and its parents) if it doesn't exist yet.
    pub fn resolve_home_dir(
        configured: Option<String>,
        default_subdir: &str,
        create: bool,
    ) -> Result<PathBuf> {
        let resolved = match configured {
            Some(raw) if !raw.trim().is_empty() => expand_tilde(&raw)?,
            _ => default_home_dir(default_subdir)?,
        };

        if create && !resolved.exists() {
            std::fs::create_dir_all(&resolved)
                .with_context(|| format!("failed to create home_dir at {}", resolved.display()))?;
        }

        Ok(resolved)
    }

    fn expand_tilde(raw: &str) -> Result<PathBuf> {
        if let Some(rest) = raw.strip_prefix("~/") {
            let home = platform_home()?;
            Ok(home.join(rest))
        } else if raw == "~" {
            platform_home()
        } else {
            Ok(PathBuf::from(raw))
        }
    }

    fn default_home_dir(subdir: &str) -> Result<PathBuf> {
        Ok(platform_home()?.join(subdir))
    }

    #[cfg(target_os = "windows")]
    fn platform_home() -> Result<PathBuf> {
        env::var("APPDATA")
            .map(PathBuf::from)
            .map_err(|_| anyhow!("APPDATA is not set; cannot resolve home_dir"))
    }

    #[cfg(not(target_os = "windows"))]
    fn platform_home() -> Result<PathBuf> {
        if let Ok(home) = env::var("HOME") {
            return Ok(PathBuf::from(home));
        }
        dirs::home_dir().ok_or_else(|| anyhow!("HOME is not set; cannot resolve home_dir"))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tempfile::tempdir;

        #[test]
        fn expands_explicit_path_verbatim() {
            let resolved = resolve_home_dir(Some("/tmp/explicit_dbqueue".into()), ".dbqueue", false)
                .unwrap();
            assert_eq!(resolved, PathBuf::from("/tmp/explicit_dbqueue"));
        }

        #[test]
        fn falls_back_to_default_subdir_when_unset() {
            let tmp = tempdir().unwrap();
            std::env::set_var("HOME", tmp.path());
            let resolved = resolve_home_dir(None, ".dbqueue", false).unwrap();
            assert_eq!(resolved, tmp.path().join(".dbqueue"));
        }

        #[test]
        fn creates_directory_when_requested() {
            let tmp = tempdir().unwrap();
            let target = tmp.path().join("nested").join("home");
            let resolved =
                resolve_home_dir(Some(target.to_string_lossy().to_string()), ".dbqueue", true)
                    .unwrap();
            assert!(resolved.exists());
        }
    }
}
