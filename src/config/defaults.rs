//! Default configuration values

/// Configuration file looked up at the repository root
pub const CONFIG_FILE_NAME: &str = "bilt.toml";

/// Persisted job state, per repository
pub const JOBS_FILE_NAME: &str = "jobs.json";

/// Last successful build record, per repository
pub const LAST_BUILD_FILE_NAME: &str = "last-build.json";

/// Package build logs, per repository
pub const LOGS_SUBDIR: &str = "logs";

/// Per-repository state under the data directory
pub const REPOSITORIES_SUBDIR: &str = "repositories";

/// Remote clones under the cache directory
pub const CHECKOUTS_SUBDIR: &str = "checkouts";

/// Default number of packages built at once
pub const DEFAULT_BUILD_JOBS: usize = 1;

/// Paths never fingerprinted
pub const DEFAULT_IGNORED_PATHS: &[&str] = &[".git", "target", "node_modules"];

/// Shell used to run build steps
pub const SHELL: &str = "sh";
