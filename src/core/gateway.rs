//! Core gateway orchestration service.
//!
//! The `GatewayService` aggregates immutable configuration (`GatewayConfig`)
//! with runtime state (client registry, rate-window state, usage counters).
//! It provides:
//! * Client registration / deletion with atomic cascade across all three maps
//! * The ordered admission pipeline: authenticate → rate-limit → record usage
//! * Stats assembly for the admin and client endpoints
//!
//! This layer deliberately avoids I/O and only manipulates in-memory data so
//! it remains fast and easily testable in isolation.
use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{GatewayConfig, RateLimits},
    core::{
        rate_limiter::{Admission, LimitScope, SlidingWindowLimiter},
        registry::{ClientRecord, ClientRegistry, RegistryError},
        usage::UsageTracker,
    },
};

/// Why a request was turned away before reaching the upstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Access denied. No API key provided.")]
    MissingKey,

    #[error("Invalid API key.")]
    InvalidKey,

    #[error("Rate limit exceeded. Maximum {limit} requests per {scope} allowed.")]
    RateLimited { scope: LimitScope, limit: u32 },
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdmissionError::MissingKey => StatusCode::UNAUTHORIZED,
            AdmissionError::InvalidKey => StatusCode::FORBIDDEN,
            AdmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Per-client stats object as exposed by /client/stats and /admin/client-stats.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub name: String,
    pub api_key: String,
    pub usage: u64,
    pub last_request: Option<DateTime<Utc>>,
    pub rate_limits: RateLimits,
    pub current_minute_requests: usize,
    pub current_day_requests: usize,
}

/// Central orchestrator for client admission control. An instance is cheap to
/// share (wrap in `Arc`); all interior state is concurrency-safe.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    registry: ClientRegistry,
    limiter: SlidingWindowLimiter,
    usage: UsageTracker,
}

impl GatewayService {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            config,
            registry: ClientRegistry::new(),
            limiter: SlidingWindowLimiter::new(),
            usage: UsageTracker::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a new client, falling back to the configured default limits
    /// when none are given. A duplicate key leaves the existing record (and
    /// its limits) untouched.
    pub async fn register_client(
        &self,
        api_key: &str,
        name: &str,
        rate_limits: Option<RateLimits>,
    ) -> Result<ClientRecord, RegistryError> {
        let limits = rate_limits.unwrap_or(self.config.default_limits);
        let record = self.registry.register(api_key, name, limits).await?;
        self.usage.create(api_key).await;
        tracing::info!(client = %name, "Registered client");
        Ok(record)
    }

    /// Delete a client and cascade removal across usage and window state, so
    /// no map retains the key once the delete completes.
    pub async fn delete_client(&self, api_key: &str) -> Result<ClientRecord, RegistryError> {
        let record = self.registry.remove(api_key).await?;
        self.usage.remove(api_key).await;
        self.limiter.remove(api_key).await;
        tracing::info!(client = %record.name, "Deleted client");
        Ok(record)
    }

    /// Resolve the bearer token to a client without consuming an admission
    /// slot. Used by the client stats endpoint.
    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
    ) -> Result<ClientRecord, AdmissionError> {
        let api_key = bearer.ok_or(AdmissionError::MissingKey)?;
        self.registry
            .lookup(api_key)
            .await
            .ok_or(AdmissionError::InvalidKey)
    }

    /// The full admission pipeline for proxied requests: authenticate, check
    /// both rate windows, then record usage. Short-circuits on the first
    /// failure; usage is recorded only for admitted requests, before any
    /// forwarding begins.
    pub async fn admit(&self, bearer: Option<&str>) -> Result<ClientRecord, AdmissionError> {
        let client = self.authenticate(bearer).await?;

        match self
            .limiter
            .admit(&client.api_key, &client.rate_limits, Instant::now())
            .await
        {
            Admission::Denied { scope, limit } => {
                tracing::warn!(client = %client.name, %scope, limit, "Rate limit exceeded");
                Err(AdmissionError::RateLimited { scope, limit })
            }
            Admission::Allowed => {
                self.usage.record(&client.api_key, Utc::now()).await;
                Ok(client)
            }
        }
    }

    /// Assemble the stats object for a single client.
    pub async fn client_stats(&self, record: &ClientRecord) -> ClientStats {
        let usage = self.usage.snapshot(&record.api_key).await.unwrap_or_default();
        let (current_minute_requests, current_day_requests) =
            self.limiter.counts(&record.api_key, Instant::now()).await;

        ClientStats {
            name: record.name.clone(),
            api_key: record.api_key.clone(),
            usage: usage.request_count,
            last_request: usage.last_request_at,
            rate_limits: record.rate_limits,
            current_minute_requests,
            current_day_requests,
        }
    }

    /// Stats for every registered client (admin enumeration).
    pub async fn all_client_stats(&self) -> Vec<ClientStats> {
        let mut stats = Vec::new();
        for record in self.registry.list().await {
            stats.push(self.client_stats(&record).await);
        }
        stats
    }
}
