//! Artifact delivery over the messaging channel.

mod courier;
mod error;
mod types;

pub use courier::{Courier, DeliveryProgress, DeliverySummary};
pub use error::DeliveryError;
pub use types::{DocumentPayload, MessageRef, Messenger, PhotoPayload, VideoPayload};
