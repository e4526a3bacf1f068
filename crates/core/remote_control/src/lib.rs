//! Vehicle discovery and the typed remote-control surface.
//!
//! The remote controller does two jobs at startup: scan the gateway
//! for vehicles, and install the gateway bridges that let the
//! `RemoteControl/U/E/vehicles/...` topics reach each vehicle. After
//! that, driving a vehicle is just publishing typed payloads through a
//! [`VehicleHandle`], which is exactly what the operator surfaces do.
#![forbid(unsafe_code)]

pub mod discover;
pub mod vehicle;

pub use discover::discover_vehicles;
pub use discover::register_vehicle;
pub use discover::DiscoverConfig;
pub use discover::VehicleRecord;
pub use vehicle::VehicleHandle;
