// Capability probing: which model and voice services a host exposes.

mod capabilities;
mod prober;

pub use capabilities::{parse_voice_list, CapabilitySource, ServerCapabilities};
pub use prober::CapabilityProber;
