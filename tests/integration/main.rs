// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Integration tests for install-harness
//!
//! These tests require a running Kubernetes cluster accessible via kubeconfig
//! and `kubectl` on the PATH. Tests are marked with #[ignore] and must be run
//! explicitly:
//!
//! ```bash
//! cargo test --test integration -- --ignored
//!
//! # Run specific test
//! cargo test --test integration test_full_run_against_cluster -- --ignored
//! ```
//!
//! The tests use your existing kubeconfig (~/.kube/config or KUBECONFIG env var).
//! Every test uses uniquely named resources and its own namespace variable, so
//! they can run in parallel.

// Shared test fixtures (used by functional, integration, and proptest)
#[path = "../common/mod.rs"]
mod common;


mod run_tests;

pub use cluster::*;
