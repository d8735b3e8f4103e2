//! Motion sync: a producer pushes position fixes to a single-slot broker, a
//! consumer polls it and derives distance, speed, velocity and acceleration
//! from consecutive samples.

pub mod broker;
pub mod config;
pub mod dashboard;
pub mod distance;
pub mod error;
pub mod kinematics;
pub mod live_status;
pub mod sensors;
pub mod sync;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use types::{DerivedEstimate, GeoPoint, PositionSample};
