use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, SocketAddr};
use tower_governor::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Decides which address a request is pinned to.
///
/// Tokens are bound to this address and a refresh from any other one raises an alert, so
/// the same client must always resolve to the same value. Addresses are canonicalised:
/// an IPv4 client seen through a dual-stack socket as `::ffff:a.b.c.d` resolves to
/// `a.b.c.d`. `X-Forwarded-For` is consulted only when the TCP peer is a trusted proxy.
///
/// The resolved address is also the rate limiter key.
#[derive(Clone, Debug)]
pub struct ClientIpExtractor {
    trusted_proxies: Vec<IpNetwork>,
}

impl ClientIpExtractor {
    #[must_use]
    pub const fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { trusted_proxies }
    }

    #[must_use]
    pub fn identify_client_ip(&self, headers: &HeaderMap, peer_addr: IpAddr) -> IpAddr {
        let peer = peer_addr.to_canonical();
        if !self.is_trusted_proxy(peer) {
            return peer;
        }

        // Rightmost hop that none of our proxies appended.
        headers
            .get_all(FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(parse_hop)
            .rev()
            .find(|hop| !self.is_trusted_proxy(*hop))
            .unwrap_or(peer)
    }

    fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }
}

/// Parses one forwarded hop. Some proxies append the source port, so `a.b.c.d:port` and
/// `[v6]:port` are accepted next to bare addresses.
fn parse_hop(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .or_else(|_| raw.parse::<SocketAddr>().map(|addr| addr.ip()))
        .ok()
        .map(|ip| ip.to_canonical())
}

impl KeyExtractor for ClientIpExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let ConnectInfo(peer) =
            req.extensions().get::<ConnectInfo<SocketAddr>>().ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.identify_client_ip(req.headers(), peer.ip()))
    }
}
