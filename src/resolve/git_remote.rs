use url::Url;

use crate::error::UrlParseError;

/// Host and repository named by a git remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemote {
    pub host: String,
    pub owner: String,
    pub repo: String,
}

/// Parses `https://host/org/repo(.git)`, `git@host:org/repo(.git)` and
/// `ssh://git@host[:port]/org/repo(.git)`.
///
/// Nested groups keep the first segment as owner and the last as repo.
pub fn parse_git_remote(remote: &str) -> Result<GitRemote, UrlParseError> {
    let remote = remote.trim();
    let invalid = || UrlParseError::InvalidGitRemote(remote.to_string());

    let (host, path) = if remote.contains("://") {
        let url = Url::parse(remote).map_err(|_| invalid())?;
        let host = url.host_str().ok_or_else(invalid)?.to_string();
        (host, url.path().to_string())
    } else {
        // scp-like: [user@]host:path
        let (authority, path) = remote.split_once(':').ok_or_else(invalid)?;
        let host = authority.rsplit('@').next().unwrap_or(authority);
        (host.to_string(), path.to_string())
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [owner, .., repo] if !host.is_empty() => {
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            if repo.is_empty() {
                return Err(invalid());
            }
            Ok(GitRemote {
                host: host.to_lowercase(),
                owner: (*owner).to_string(),
                repo: repo.to_string(),
            })
        }
        _ => Err(invalid()),
    }
}
