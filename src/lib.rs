//! Weft - CRD-driven Kubernetes operator for a service-mesh control plane
//!
//! Weft installs and continuously converges a service-mesh control plane from
//! a single declarative `Mesh` resource. The controller follows the Kubernetes
//! operator pattern: every change to a `Mesh` object triggers one synchronous
//! reconciliation pass that drives the cluster toward the declared state.
//!
//! # Architecture
//!
//! A pass is deliberately simple and stateless:
//! - The `Mesh` object is re-fetched fresh on every invocation.
//! - Prerequisite mesh API definitions (CRDs) are registered before any
//!   component work starts.
//! - A fixed, dependency-ordered pipeline of component reconcilers is built
//!   from the spec and executed strictly in order, stopping at the first
//!   error.
//! - A failed pass is retried from the top by the controller runtime; every
//!   component is idempotent, so re-running against already-correct state is
//!   a no-op.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (`Mesh` and the mesh API kinds)
//! - [`controller`] - Reconciliation loop for `Mesh` resources
//! - [`components`] - Component reconcilers and the ordered pipeline
//! - [`schema`] - Mesh API definition registration (prerequisite gate)
//! - [`apply`] - Server-side apply capability threaded through components
//! - [`resources`] - Kubernetes manifest builders for component output
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod apply;
pub mod components;
pub mod controller;
pub mod crd;
pub mod error;
pub mod resources;
pub mod schema;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for all server-side apply patches
pub const FIELD_MANAGER: &str = "weft-operator";

/// Default image registry for control-plane components
pub const DEFAULT_HUB: &str = "ghcr.io/weft-mesh";
