//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are read by the binaries, never during
//! request handling.

use crate::constants::{DEFAULT_AGE_WINDOW_YEARS, DEFAULT_COHORT_LIMIT};
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    cohort_limit: usize,
    age_window_years: i64,
    plan_catalog_path: Option<PathBuf>,
    bundle_path: Option<PathBuf>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `cohort_limit` is zero or `age_window_years` is
    /// negative.
    pub fn new(cohort_limit: usize, age_window_years: i64) -> CoreResult<Self> {
        if cohort_limit == 0 {
            return Err(CoreError::InvalidInput(
                "cohort_limit must be at least 1".into(),
            ));
        }
        if age_window_years < 0 {
            return Err(CoreError::InvalidInput(
                "age_window_years cannot be negative".into(),
            ));
        }

        Ok(Self {
            cohort_limit,
            age_window_years,
            plan_catalog_path: None,
            bundle_path: None,
        })
    }

    /// Use a YAML catalog file instead of the built-in default plans when seeding.
    pub fn with_plan_catalog(mut self, path: Option<PathBuf>) -> Self {
        self.plan_catalog_path = path;
        self
    }

    /// Preload the store from a bundle file at bootstrap.
    pub fn with_bundle(mut self, path: Option<PathBuf>) -> Self {
        self.bundle_path = path;
        self
    }

    pub fn cohort_limit(&self) -> usize {
        self.cohort_limit
    }

    pub fn age_window_years(&self) -> i64 {
        self.age_window_years
    }

    pub fn plan_catalog_path(&self) -> Option<&Path> {
        self.plan_catalog_path.as_deref()
    }

    pub fn bundle_path(&self) -> Option<&Path> {
        self.bundle_path.as_deref()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cohort_limit: DEFAULT_COHORT_LIMIT,
            age_window_years: DEFAULT_AGE_WINDOW_YEARS,
            plan_catalog_path: None,
            bundle_path: None,
        }
    }
}

/// Parse an optional path from an environment value.
///
/// `None` and empty/whitespace values both mean "not configured".
pub fn path_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
