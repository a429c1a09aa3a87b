//! Control-plane path tracing across a multi-vendor network fleet.
//!
//! Given a source and destination IP, the tracer resolves the starting
//! device from the inventory, then walks hop by hop: it asks each
//! device's routing table for the best route, enriches the hop with
//! interface state (and, on firewalls, the matched security policy and
//! NAT translation), resolves the next-hop address back to an inventory
//! device and moves on. No packets are sent; the path is reconstructed
//! entirely from authoritative device state.

pub mod credentials;
pub mod drivers;
pub mod error;
pub mod inventory;
pub mod model;
pub mod net;
pub mod parsers;
pub mod tracer;
pub mod transport;

pub use crate::credentials::{CredentialSet, CredentialStore};
pub use crate::error::TraceError;
pub use crate::inventory::Inventory;
pub use crate::model::{PathHop, PathStatus, TracePath, TracerConfig};
pub use crate::tracer::{PathTracer, TraceRequest};
