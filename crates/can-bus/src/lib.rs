//! CAN Frame Ingestion and Fan-Out
//!
//! Receives frames from a bus driver, admits a fixed set of identifiers at a
//! bounded rate, and fans admitted frames out to a small set of bounded
//! subscriber queues. A synthetic drive-profile generator can feed the same
//! fan-out stage.

mod allow_list;
mod driver;
mod error;
mod frame;
mod rate_limit;
mod registry;
mod simulator;
mod source;

pub use allow_list::{is_listed, VEHICLE_BUS_IDS};
pub use driver::{
    parse_candump_line, BusDriver, BusState, BusStatus, ChannelDriver, NullDriver, ReplayDriver,
};
pub use error::BusError;
pub use frame::{Frame, MonotonicClock, TimestampedFrame};
pub use rate_limit::{Admission, RateLimiter, MIN_INTERVAL_US};
pub use registry::{
    PublishReport, RegistryStats, Subscription, SubscriptionRegistry, DEFAULT_QUEUE_CAPACITY,
    MAX_SUBSCRIPTIONS,
};
pub use simulator::{drive_profile_frames, Simulator, SimulatorConfig, PROFILE_STEPS};
pub use source::{FrameSource, IngestStats, REPORT_INTERVAL};
