//! Mutual whitelist evaluation
//!
//! A peer survives a requester's conflict resolution only when both sides
//! list each other. One-sided declarations are ignored so a driver cannot
//! opt itself out of being disabled.

use crate::driver::ControllerDescriptor;

/// Result of checking a (requester, peer) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Both sides list each other and the peer is running
    Exempt,
    /// Requester declares no compatible peers at all
    NoWhitelist,
    /// Requester does not list the peer
    NotListed,
    /// Requester lists the peer but the peer does not list the requester
    OneSided,
    /// Mutually listed, but the peer is off and needs no protection
    PeerDisabled,
}

pub fn evaluate(requester: &ControllerDescriptor, peer: &ControllerDescriptor) -> Verdict {
    if !requester.has_whitelist() {
        return Verdict::NoWhitelist;
    }
    if !requester.declares(peer.name().as_str()) {
        return Verdict::NotListed;
    }
    if !peer.declares(requester.name().as_str()) {
        return Verdict::OneSided;
    }
    if !peer.is_enabled() {
        return Verdict::PeerDisabled;
    }
    Verdict::Exempt
}

/// Whether `peer` is exempt from being disabled by `requester`
pub fn is_exempt(requester: &ControllerDescriptor, peer: &ControllerDescriptor) -> bool {
    evaluate(requester, peer) == Verdict::Exempt
}
