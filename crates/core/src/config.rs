use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Session configuration: built once from the environment, then handed to
/// the service clients. Credentials are never re-specified per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub athena: AthenaConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `LAKEWIRE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("LAKEWIRE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            athena: AthenaConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:     region={}, static_credentials={}",
            self.aws.region,
            self.aws.has_static_credentials(),
        );
        tracing::info!(
            "  athena:  database={}, workgroup={}, output={}",
            self.athena.database,
            self.athena.workgroup,
            self.athena.output_bucket.as_deref().unwrap_or("(none)"),
        );
    }
}

// ── AWS credentials / region ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    pub fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    /// Both halves of a static key pair are present. When false, clients
    /// fall back to the ambient provider chain (env, profile, IMDS).
    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Athena ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// Default database for statement submission.
    pub database: String,
    /// Athena workgroup.
    pub workgroup: String,
    /// Bucket receiving query result sets. Required before any submission.
    pub output_bucket: Option<String>,
    /// Poll timeout for `wait_for_completion`, in seconds.
    pub timeout_seconds: u32,
}

impl AthenaConfig {
    pub fn from_env_profiled(p: &str) -> Self {
        Self {
            database: profiled_env_or(p, "ATHENA_DATABASE", "default"),
            workgroup: profiled_env_or(p, "ATHENA_WORKGROUP", "primary"),
            output_bucket: profiled_env_opt(p, "ATHENA_OUTPUT_BUCKET"),
            timeout_seconds: profiled_env_u32(p, "ATHENA_TIMEOUT_SECONDS", 300),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.output_bucket.is_some()
    }

    /// Result output location URI, e.g. `s3://my-bucket`.
    pub fn output_location(&self) -> Option<String> {
        self.output_bucket.as_ref().map(|b| format!("s3://{}", b))
    }
}

// ── Tests ────────────────────────────────────────────────────
