//! Start-up configuration of the dispatch core.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default polymorphic inline cache size, matching the classic 8-entry PIC.
pub const DEFAULT_CACHE_LIMIT: usize = 8;

/// Largest accepted cache limit. Call sites reserve every slot up front.
pub const MAX_CACHE_LIMIT: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchOptions {
    /// Specializations a call site may learn before it turns megamorphic.
    pub cache_limit: usize,
    /// Name of the handler consulted when lookup fails.
    pub method_missing: String,
    /// Name of the hook consulted by `defined?` for dynamically handled names.
    pub respond_to_missing: String,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            cache_limit: DEFAULT_CACHE_LIMIT,
            method_missing: "method_missing".to_string(),
            respond_to_missing: "respond_to_missing?".to_string(),
        }
    }
}

impl DispatchOptions {
    pub const CACHE_LIMIT_ENV: &'static str = "LKR_DISPATCH_CACHE";

    pub fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit;
        self
    }

    pub fn from_toml_str(src: &str) -> Result<Self> {
        let options: DispatchOptions = toml::from_str(src).context("invalid dispatch configuration")?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src =
            fs::read_to_string(path).with_context(|| format!("failed to read dispatch config {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("while loading {}", path.display()))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();
        options.apply_env(|key| std::env::var(key).ok())?;
        Ok(options)
    }

    /// Apply environment overrides using `read` to fetch variables.
    pub fn apply_env<F>(&mut self, read: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = read(Self::CACHE_LIMIT_ENV) {
            let trimmed = raw.trim();
            self.cache_limit = trimmed
                .parse()
                .map_err(|_| anyhow!("{} must be a non-negative integer, got {trimmed:?}", Self::CACHE_LIMIT_ENV))?;
        }
        self.validate().with_context(|| format!("invalid {}", Self::CACHE_LIMIT_ENV))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_limit > MAX_CACHE_LIMIT {
            return Err(anyhow!("cache_limit {} exceeds the maximum of {MAX_CACHE_LIMIT}", self.cache_limit));
        }
        if self.method_missing.is_empty() {
            return Err(anyhow!("method_missing handler name must not be empty"));
        }
        if self.respond_to_missing.is_empty() {
            return Err(anyhow!("respond_to_missing hook name must not be empty"));
        }
        Ok(())
    }
}

