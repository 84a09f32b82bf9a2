// Discovery: find the companion server without the user typing an address.
//
// The coordinator walks an ordered ladder of tiers (cached → mDNS → peer
// beacon → subnet scan). QR codes and manual entry bypass the ladder.

mod coordinator;
pub mod entry;
pub mod tiers;
mod types;

pub use coordinator::{DiscoveryCoordinator, DiscoveryEvent};
pub use entry::{parse_manual, parse_port, parse_qr_payload, Endpoint, EntryError};
pub use tiers::{TierMatch, TierProbe};
pub use types::{DiscoveredServer, DiscoveryMethod, DiscoveryState, DiscoveryTier};
