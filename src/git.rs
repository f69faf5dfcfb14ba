use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};

use crate::cmd::Cmd;

/// Get the root directory of the git repository containing the given path.
pub fn get_repo_root_for(dir: &Path) -> Result<PathBuf> {
    let path = Cmd::new("git")
        .workdir(dir)
        .args(&["rev-parse", "--show-toplevel"])
        .run_and_capture_stdout()
        .with_context(|| format!("Not a git repository: {}", dir.display()))?;
    Ok(PathBuf::from(path))
}

/// Get the URL configured for a remote.
pub fn get_remote_url(remote: &str, workdir: &Path) -> Result<String> {
    let url = Cmd::new("git")
        .workdir(workdir)
        .args(&["remote", "get-url", remote])
        .run_and_capture_stdout()
        .with_context(|| format!("Failed to get URL for remote '{}'", remote))?;
    if url.is_empty() {
        return Err(anyhow!("Remote '{}' has an empty URL", remote));
    }
    Ok(url)
}

/// Repository name from a remote URL, used as the checkout directory in sandboxes.
///
/// Handles scp-like (`git@host:owner/repo.git`), URL and plain path forms.
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_from_https_url() {
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets.git").as_deref(),
            Some("widgets")
        );
    }

    #[test]
    fn test_repo_name_from_https_url_no_git_suffix() {
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets/").as_deref(),
            Some("widgets")
        );
    }

    #[test]
    fn test_repo_name_from_scp_url() {
        assert_eq!(
            repo_name_from_url("git@github.com:acme/widgets.git").as_deref(),
            Some("widgets")
        );
    }

    #[test]
    fn test_repo_name_from_scp_url_without_owner() {
        assert_eq!(
            repo_name_from_url("git@host:widgets.git").as_deref(),
            Some("widgets")
        );
    }

    #[test]
    fn test_repo_name_from_local_path() {
        assert_eq!(
            repo_name_from_url("/srv/git/widgets").as_deref(),
            Some("widgets")
        );
    }

    #[test]
    fn test_repo_name_from_empty_url() {
        assert_eq!(repo_name_from_url(""), None);
        assert_eq!(repo_name_from_url(".git"), None);
    }

    #[test]
    fn test_get_repo_root_for_non_repo_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        // Only meaningful when the temp dir is not inside a repository
        if Cmd::new("git")
            .workdir(dir.path())
            .args(&["rev-parse", "--git-dir"])
            .run_as_check()
            .unwrap_or(true)
        {
            return;
        }
        assert!(get_repo_root_for(dir.path()).is_err());
    }
}
