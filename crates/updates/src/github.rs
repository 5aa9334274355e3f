//! GitHub tree listing and raw file retrieval with branch fallback.

use {
    serde::Deserialize,
    skillsync_common::{Ttl, TtlCache},
    skillsync_scanner::manifest::MANIFEST_FILE,
    std::{collections::HashMap, sync::Arc, time::Duration},
    tracing::{debug, warn},
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Branch names tried in order when a repository's default branch is unknown.
pub const BRANCH_CANDIDATES: [&str; 2] = ["main", "master"];

/// How long a fetched repository tree stays fresh.
pub const TREE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const USER_AGENT: &str = "skillsync";

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("source is not an owner/repo reference: {0}")]
    UnsupportedSource(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("no readable tree for {0} on any candidate branch")]
    NoBranch(String),
    #[error("{path} not found in {source_ref} on any candidate branch")]
    FileNotFound { source_ref: String, path: String },
}

/// Parse `owner/repo` from a source string. Accepts the plain form or a
/// GitHub URL, with optional trailing slash or `.git`.
pub fn parse_source(source: &str) -> Result<(String, String), UpdateError> {
    let s = source.trim().trim_end_matches('/').trim_end_matches(".git");
    let s = s
        .strip_prefix("https://github.com/")
        .or_else(|| s.strip_prefix("http://github.com/"))
        .or_else(|| s.strip_prefix("github.com/"))
        .unwrap_or(s);
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(UpdateError::UnsupportedSource(source.to_string()));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    #[serde(default)]
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

/// A repository's file tree on the branch that answered.
#[derive(Debug, Clone)]
pub struct RepoTree {
    pub branch: String,
    pub root_sha: String,
    pub nodes: Vec<TreeNode>,
}

impl RepoTree {
    /// Hash of the directory at a repository-relative path. The empty path
    /// addresses the repository root.
    pub fn folder_hash(&self, folder: &str) -> Option<&str> {
        if folder.is_empty() {
            return Some(&self.root_sha);
        }
        self.nodes
            .iter()
            .find(|n| n.kind == "tree" && n.path == folder)
            .map(|n| n.sha.as_str())
    }

    /// Every directory directly containing a manifest file, mapped to its
    /// current hash. A manifest at the repository root maps the empty path to
    /// the root hash.
    pub fn manifest_folder_hashes(&self) -> HashMap<String, String> {
        let nested_suffix = format!("/{MANIFEST_FILE}");
        let mut hashes = HashMap::new();
        for node in &self.nodes {
            if node.kind != "blob" {
                continue;
            }
            let folder = if node.path == MANIFEST_FILE {
                ""
            } else {
                match node.path.strip_suffix(&nested_suffix) {
                    Some(folder) => folder,
                    None => continue,
                }
            };
            if let Some(hash) = self.folder_hash(folder) {
                hashes.insert(folder.to_string(), hash.to_string());
            }
        }
        hashes
    }
}

/// GitHub lookups over the REST tree endpoint and the raw file host, with a
/// bounded per-repository tree cache. Base URLs are injectable so tests can
/// point the client at a local server.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    raw_base: String,
    trees: TtlCache<String, Arc<RepoTree>>,
}

impl Default for GithubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubClient {
    pub fn new() -> Self {
        Self::with_base_urls(DEFAULT_API_BASE, DEFAULT_RAW_BASE)
    }

    pub fn with_base_urls(api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            raw_base: raw_base.into(),
            trees: TtlCache::new(Ttl::fixed(TREE_CACHE_TTL)),
        }
    }

    /// Fetch the recursive file tree for a source repository, trying each
    /// candidate branch in order. Fetched trees are cached per repository.
    pub async fn fetch_tree(&self, source: &str) -> Result<Arc<RepoTree>, UpdateError> {
        let (owner, repo) = parse_source(source)?;
        let key = format!("{owner}/{repo}");
        if let Some(tree) = self.trees.get(&key) {
            debug!(source = %key, "tree cache hit");
            return Ok(tree);
        }

        let mut last_err: Option<UpdateError> = None;
        for branch in BRANCH_CANDIDATES {
            let url = format!(
                "{}/repos/{owner}/{repo}/git/trees/{branch}?recursive=1",
                self.api_base
            );
            let response = match self
                .http
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                },
            };
            if !response.status().is_success() {
                debug!(source = %key, %branch, status = %response.status(), "no tree on branch");
                continue;
            }
            let parsed = response.json::<TreeResponse>().await?;
            if parsed.truncated {
                warn!(source = %key, %branch, "tree listing truncated, some folders may be missed");
            }
            let tree = Arc::new(RepoTree {
                branch: branch.to_string(),
                root_sha: parsed.sha,
                nodes: parsed.tree,
            });
            self.trees.set(key, Arc::clone(&tree));
            return Ok(tree);
        }
        Err(last_err.unwrap_or(UpdateError::NoBranch(key)))
    }

    /// Fetch a raw manifest file by repository-relative path, trying each
    /// candidate branch in order.
    pub async fn fetch_manifest(&self, source: &str, path: &str) -> Result<String, UpdateError> {
        let (owner, repo) = parse_source(source)?;
        let mut last_err: Option<UpdateError> = None;
        for branch in BRANCH_CANDIDATES {
            let url = format!("{}/{owner}/{repo}/{branch}/{path}", self.raw_base);
            let response = match self
                .http
                .get(&url)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                },
            };
            if !response.status().is_success() {
                continue;
            }
            return Ok(response.text().await?);
        }
        Err(last_err.unwrap_or_else(|| UpdateError::FileNotFound {
            source_ref: format!("{owner}/{repo}"),
            path: path.to_string(),
        }))
    }
}
