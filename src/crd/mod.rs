//! Custom Resource Definitions for the Weft operator

mod mesh;
mod policy;

pub use mesh::{Mesh, MeshSpec};
pub use policy::{
    GatewayRoute, GatewayRouteSpec, MeshPolicy, MeshPolicySpec, MtlsMode, MtlsSettings,
    RouteProtocol, TrafficPolicy, TrafficPolicySpec,
};
