//! Data plane components
//!
//! Neighbor cache, context table and the ND proxy that ties them to the two
//! links. `Gateway` is the entry point the daemon drives.

pub mod context_table;
mod gateway;
mod maintenance;
pub mod nd_proxy;
pub mod neighbor_cache;
mod timer;

pub use context_table::{AddressContext, ContextState, ContextSweep, ContextTable};
pub use gateway::{Gateway, GatewaySettings, Transmit};
pub use maintenance::{run_maintenance, MaintenanceReport};
pub use nd_proxy::{
    policy_for, NdAction, NdProxy, PendingAndRouters, PendingOnly, ProxySettings, RaForwardPolicy,
    RouterInfo,
};
pub use neighbor_cache::{NeighborCache, NeighborEntry, NeighborLifetimes, RegistrationState};
pub use timer::Timer;
