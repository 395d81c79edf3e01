use std::net::IpAddr;

use crate::{Cancelable, FlowError};

/// Which address families a resolution may yield, and in what order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPreference {
    Ipv4Only,
    Ipv6Only,
    Ipv4OrIpv6,
    Ipv6OrIpv4,
    Any,
}

impl AddressPreference {
    /// Whether an address of this family may appear in a result.
    pub fn permits(&self, addr: &IpAddr) -> bool {
        match self {
            Self::Ipv4Only => addr.is_ipv4(),
            Self::Ipv6Only => addr.is_ipv6(),
            Self::Ipv4OrIpv6 | Self::Ipv6OrIpv4 | Self::Any => true,
        }
    }

    /// Filters and orders `addresses` according to the preference. `Any`
    /// keeps the resolver's order.
    pub fn apply(&self, addresses: Vec<IpAddr>) -> Vec<IpAddr> {
        let mut addresses: Vec<_> = addresses
            .into_iter()
            .filter(|addr| self.permits(addr))
            .collect();
        match self {
            Self::Ipv4OrIpv6 => addresses.sort_by_key(|addr| addr.is_ipv6()),
            Self::Ipv6OrIpv4 => addresses.sort_by_key(|addr| addr.is_ipv4()),
            _ => {}
        }
        addresses
    }
}

/// Completion callback for [`Resolver::resolve`].
pub type ResolveHandler = Box<dyn FnOnce(Result<Vec<IpAddr>, FlowError>)>;

/// Asynchronous name resolution, consumed by transport flows.
///
/// Implementations deliver the handler through the runloop, never inline with
/// the call; the returned [`Cancelable`] only suppresses delivery.
pub trait Resolver {
    /// Resolves `domain` into addresses matching `preference`.
    fn resolve(
        &self,
        domain: &str,
        preference: AddressPreference,
        handler: ResolveHandler,
    ) -> Cancelable;
}
