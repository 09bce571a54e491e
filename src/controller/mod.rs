//! Controller implementation for the Mesh CRD
//!
//! This module contains the reconciliation loop driving a cluster's live
//! control-plane installation toward the declared `Mesh` spec.

mod mesh;

pub use mesh::{
    error_policy, reconcile, reconcile_mesh, Context, ContextBuilder, MeshApi, MeshKey, MeshSource,
};
