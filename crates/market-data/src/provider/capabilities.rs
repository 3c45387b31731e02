//! Provider capabilities.
//!
//! Describes which operations an adapter implements so the service can skip
//! adapters that cannot serve a request instead of collecting
//! `NotSupported` errors.

use serde::{Deserialize, Serialize};

use crate::models::Request;

/// One operation an adapter may support.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Quote,
    Historical,
    Fx,
    Batch,
}

impl Capability {
    /// The capability needed to answer `request`.
    pub fn for_request(request: &Request) -> Self {
        match request {
            Request::Quote { .. } => Capability::Quote,
            Request::Historical { .. } => Capability::Historical,
            Request::ExchangeRate { .. } => Capability::Fx,
        }
    }
}

/// Describes what a market data provider can do.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    /// Latest quote for a single symbol.
    pub quote: bool,

    /// Price history per timeframe.
    pub historical: bool,

    /// Currency exchange rates.
    pub fx: bool,

    /// Several quotes in one upstream call.
    pub batch: bool,
}

impl ProviderCapabilities {
    /// Everything.
    pub const ALL: Self = Self {
        quote: true,
        historical: true,
        fx: true,
        batch: true,
    };

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Quote => self.quote,
            Capability::Historical => self.historical,
            Capability::Fx => self.fx,
            Capability::Batch => self.batch,
        }
    }
}
