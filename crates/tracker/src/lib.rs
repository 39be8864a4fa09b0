//! lure-tracker: the result state machine.
//!
//! [`ResultTracker`] consumes send callbacks and recipient interactions,
//! appends one Event per call and advances the Result's status in
//! precedence order, all inside one storage snapshot. It also allocates
//! result identifiers, enriches Results with GeoIP coordinates and
//! summarizes campaigns.

mod error;
pub mod geo;
pub mod stats;
mod tracker;
pub mod transition;

pub use error::TrackerError;
pub use geo::{Coordinates, GeoEntry, GeoError, GeoLocator, NoGeoLocator, StaticGeoTable};
pub use stats::CampaignStats;
pub use tracker::{Clock, Outcome, ResultTracker, SystemClock};
pub use transition::Transition;
