use std::path::PathBuf;

use chrono::TimeDelta;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{ContractError, Resolution};
use crate::retry::RetryPolicy;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. Default: false (jobs run in-process).
    /// Note: the worker binary ignores this field (always requires MQ).
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue for generation tasks (server publishes, worker consumes). Default: "generation_jobs".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
    /// Queue for dead-lettered tasks (worker publishes, server consumes). Default: "generation_dlq".
    #[serde(default = "default_mq_dlq_queue_name")]
    pub dlq_queue_name: String,
}

fn default_mq_enabled() -> bool {
    false
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "generation_jobs".into()
}
fn default_mq_dlq_queue_name() -> String {
    "generation_dlq".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
            dlq_queue_name: default_mq_dlq_queue_name(),
        }
    }
}

/// Retry, dead-letter and stuck-job settings.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    /// Extra attempts for transient worker failures. Default: 2.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Default: 500.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Default: 30000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Processing jobs older than this are failed as stuck. Default: 900.
    #[serde(default = "default_stuck_job_timeout_secs")]
    pub stuck_job_timeout_secs: u64,
    /// Default: 60.
    #[serde(default = "default_stuck_job_scan_interval_secs")]
    pub stuck_job_scan_interval_secs: u64,
}

fn default_max_retries() -> u8 {
    2
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_stuck_job_timeout_secs() -> u64 {
    900
}
fn default_stuck_job_scan_interval_secs() -> u64 {
    60
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            stuck_job_timeout_secs: default_stuck_job_timeout_secs(),
            stuck_job_scan_interval_secs: default_stuck_job_scan_interval_secs(),
        }
    }
}

/// A dead-letter setting the stuck job detector cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DlqConfigError {
    #[error("dlq.stuck_job_timeout_secs is out of range: {0}")]
    TimeoutOutOfRange(u64),
    #[error("dlq.stuck_job_scan_interval_secs must be positive")]
    ZeroScanInterval,
}

/// `secs` as a signed duration, if chrono can represent it.
pub fn timeout_delta(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

impl DlqConfig {
    pub fn validate(&self) -> Result<(), DlqConfigError> {
        if timeout_delta(self.stuck_job_timeout_secs).is_none() {
            return Err(DlqConfigError::TimeoutOutOfRange(
                self.stuck_job_timeout_secs,
            ));
        }
        if self.stuck_job_scan_interval_secs == 0 {
            return Err(DlqConfigError::ZeroScanInterval);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

/// Blob storage settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Default: "./data/blobs".
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
    /// Default: 20 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    /// Base URL that resolved blob and upload URLs are built from.
    /// Default: "http://127.0.0.1:3000".
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Handles never attached to a generation are deleted after this long.
    /// Default: 86400.
    #[serde(default = "default_unattached_ttl_secs")]
    pub unattached_ttl_secs: u64,
    /// Default: 3600.
    #[serde(default = "default_unattached_sweep_interval_secs")]
    pub unattached_sweep_interval_secs: u64,
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_max_blob_size() -> u64 {
    20 * 1024 * 1024
}
fn default_public_url() -> String {
    "http://127.0.0.1:3000".into()
}
fn default_unattached_ttl_secs() -> u64 {
    86_400
}
fn default_unattached_sweep_interval_secs() -> u64 {
    3_600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: default_blob_dir(),
            max_blob_size: default_max_blob_size(),
            public_url: default_public_url(),
            unattached_ttl_secs: default_unattached_ttl_secs(),
            unattached_sweep_interval_secs: default_unattached_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageConfigError {
    #[error("storage.unattached_ttl_secs is out of range: {0}")]
    TtlOutOfRange(u64),
    #[error("storage.unattached_sweep_interval_secs must be positive")]
    ZeroSweepInterval,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), StorageConfigError> {
        if timeout_delta(self.unattached_ttl_secs).is_none() {
            return Err(StorageConfigError::TtlOutOfRange(self.unattached_ttl_secs));
        }
        if self.unattached_sweep_interval_secs == 0 {
            return Err(StorageConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

/// External image model endpoint and request parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Default: "http://127.0.0.1:8188/v1/sketch-to-image".
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    /// Sent as a bearer token when present.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default: 120.
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub resolution: Resolution,
    /// Default: 7.5.
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    /// How far the model may depart from the sketch, 0..=1. Default: 0.8.
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: Option<String>,
}

fn default_model_endpoint() -> String {
    "http://127.0.0.1:8188/v1/sketch-to-image".into()
}
fn default_model_timeout_secs() -> u64 {
    120
}
fn default_guidance_scale() -> f32 {
    7.5
}
fn default_strength() -> f32 {
    0.8
}
fn default_negative_prompt() -> Option<String> {
    Some("blurry, low quality, distorted".into())
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            api_key: None,
            timeout_secs: default_model_timeout_secs(),
            resolution: Resolution::default(),
            guidance_scale: default_guidance_scale(),
            strength: default_strength(),
            negative_prompt: default_negative_prompt(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ContractError> {
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(ContractError::InvalidParameter(format!(
                "strength must be within 0..=1, got {}",
                self.strength
            )));
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale <= 0.0 {
            return Err(ContractError::InvalidParameter(format!(
                "guidance_scale must be positive, got {}",
                self.guidance_scale
            )));
        }
        Ok(())
    }
}
