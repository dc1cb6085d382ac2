#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Resource offer algebra: pools, requests, fragments and the per-offer
//! operation compiler.

mod offer;
mod operation;
mod pool;
pub mod ranges;
mod resource;

pub use offer::{Offer, OfferPlan};
pub use operation::OfferOperation;
pub use pool::{Reservation, ResourcePool, ResourceRequest, VolumeRequest};
pub use ranges::PortRange;
pub use resource::{
    DiskInfo, ReservationInfo, Resource, ResourceValue, CPUS, DISK, MEM, PORTS, UNRESERVED_ROLE,
};
