//! Per-attempt protocol exchange state.

use samael::schema::AuthnRequest;

use super::{SecurityParameters, metadata::Binding};

/// The IdP endpoint a message is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub entity_id: String,
    pub location: String,
    pub binding: Binding,
}

/// Everything one encode call needs, built complete before encoding starts
/// and consumed by it.
#[derive(Debug)]
pub struct ProtocolExchangeContext {
    pub message: AuthnRequest,
    pub peer: PeerEndpoint,
    /// Absent when requests to this IdP are not signed.
    pub security: Option<SecurityParameters>,
    pub relay_state: Option<String>,
    /// Drop any query string already present on the peer location.
    pub clear_destination_query: bool,
}
