//! lure-core: domain types shared by the Lure workspace.
//!
//! - [`Status`] / [`EventKind`] -- result statuses and event kinds, with the
//!   precedence chain used by the state machine
//! - [`EventPayload`] -- typed payload of one inbound interaction
//! - [`HitClassifier`] / [`GatewayClassifier`] -- gateway and prescanner
//!   detection from source IP and User-Agent
//! - [`ScreeningPolicy`] -- how classified hits affect status transitions
//! - [`generate_rid`] -- public result identifier generation

pub mod cidr;
pub mod classifier;
pub mod error;
pub mod event;
pub mod policy;
pub mod rid;
pub mod status;

pub use cidr::CidrBlock;
pub use classifier::{
    ClassifierConfig, GatewayClassifier, GatewayMatch, HitClassifier, NoopClassifier,
};
pub use error::{ClassifierError, RidError};
pub use event::{BrowserInfo, EventPayload, InteractionDetails, SendFailure};
pub use policy::ScreeningPolicy;
pub use rid::{generate_rid, generate_rid_with, is_valid_rid, RID_ALPHABET, RID_LENGTH};
pub use status::{EventKind, Status};
