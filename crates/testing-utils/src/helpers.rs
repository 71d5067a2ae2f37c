//! Test helper utilities and common testing patterns
//!
//! This module provides utilities for waiting on asynchronous state changes
//! and for building dispatcher configurations suited to tests.

use std::time::Duration;

use dispatch_core::{DispatcherConfig, SelectionStrategyKind};
use tokio::time::{sleep, Instant};

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    ///
    /// Uses tokio's clock, so tests running with paused time advance
    /// virtual time instead of sleeping for real.
    pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        Self::wait_for_with_interval(condition, timeout, Duration::from_millis(10)).await
    }

    /// Wait for a condition with a custom poll interval
    pub async fn wait_for_with_interval<F, Fut>(
        mut condition: F,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(poll_interval).await;
        }

        condition().await
    }

    /// Let spawned tasks run until they block
    pub async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }
}

/// Dispatcher configurations for tests
pub struct TestConfig;

impl TestConfig {
    /// Production timings with the stable selection strategy
    pub fn dispatcher() -> DispatcherConfig {
        DispatcherConfig {
            selection_strategy: SelectionStrategyKind::Stable,
            ..DispatcherConfig::default()
        }
    }

    /// Same timings without the cool-down between jobs
    pub fn without_cooldown() -> DispatcherConfig {
        DispatcherConfig {
            inter_job_delay_seconds: 0,
            ..Self::dispatcher()
        }
    }
}

/// Integration test setup helpers
pub struct IntegrationTestSetup;

impl IntegrationTestSetup {
    /// Set up logging for tests (call once per test binary)
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}
