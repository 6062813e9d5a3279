//! Network link supervision.
//!
//! The link is an external collaborator behind the [`NetworkLink`] trait.
//! [`LinkSupervisor`] applies the connection policy as a state machine
//! ticked from the render loop, so nothing here runs in a callback or on
//! another thread:
//!
//! ```text
//! Connecting ──connected──▶ Connected ──lost──▶ Reconnecting
//!     │                         ▲                    │
//!     └─timeout─▶ AccessPoint   └─────connected──────┘
//! ```
//!
//! Reconnect attempts repeat every [`RECONNECT_BACKOFF_MS`] until the link
//! comes back. A failed first association falls back to access-point mode
//! for configuration instead of retrying forever.

use crate::config::WifiConfig;
use serde::Serialize;
use std::net::IpAddr;

/// Delay between two reconnect attempts.
pub const RECONNECT_BACKOFF_MS: u32 = 5_000;

/// Link details reported by `/api/info`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct LinkInfo {
    pub ip: String,
    pub ssid: String,
    pub mac: String,
    /// Signal strength in dBm.
    pub rssi: i32,
}

/// A network interface that can associate with an access point.
pub trait NetworkLink {
    /// Start associating. Must return without waiting for the result.
    fn begin(&mut self, ssid: &str, password: &str);
    fn is_connected(&self) -> bool;
    /// Open a local access point for configuration.
    fn start_access_point(&mut self, hostname: &str);
    fn info(&self) -> LinkInfo;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting { since_ms: u32 },
    Connected,
    Reconnecting { last_attempt_ms: u32, attempts: u32 },
    AccessPoint,
}

pub struct LinkSupervisor<L: NetworkLink> {
    link: L,
    wifi: WifiConfig,
    state: LinkState,
}

impl<L: NetworkLink> LinkSupervisor<L> {
    pub fn new(link: L, wifi: WifiConfig) -> Self {
        Self {
            link,
            wifi,
            state: LinkState::Idle,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn hostname(&self) -> &str {
        &self.wifi.hostname
    }

    /// Begin the first association attempt.
    pub fn start(&mut self, now_ms: u32) {
        tracing::info!("Connecting to {:?}...", self.wifi.ssid);
        self.link.begin(&self.wifi.ssid, &self.wifi.pwd);
        self.state = LinkState::Connecting { since_ms: now_ms };
    }

    /// Advance the state machine. Returns the new state on a transition.
    pub fn tick(&mut self, now_ms: u32) -> Option<LinkState> {
        let connected = self.link.is_connected();

        let next = match self.state {
            LinkState::Idle | LinkState::AccessPoint => None,
            LinkState::Connecting { .. } if connected => Some(LinkState::Connected),
            LinkState::Connecting { since_ms } => {
                if now_ms.wrapping_sub(since_ms) >= self.wifi.timeout {
                    tracing::warn!(
                        "No connection to {:?} after {} ms, starting access point",
                        self.wifi.ssid,
                        self.wifi.timeout
                    );
                    self.link.start_access_point(&self.wifi.hostname);
                    Some(LinkState::AccessPoint)
                } else {
                    None
                }
            }
            LinkState::Connected if connected => None,
            LinkState::Connected => {
                tracing::warn!("Connection lost, reconnecting");
                self.link.begin(&self.wifi.ssid, &self.wifi.pwd);
                Some(LinkState::Reconnecting {
                    last_attempt_ms: now_ms,
                    attempts: 1,
                })
            }
            LinkState::Reconnecting { .. } if connected => Some(LinkState::Connected),
            LinkState::Reconnecting {
                last_attempt_ms,
                attempts,
            } => {
                if now_ms.wrapping_sub(last_attempt_ms) >= RECONNECT_BACKOFF_MS {
                    tracing::debug!("Reconnect attempt {}", attempts + 1);
                    self.link.begin(&self.wifi.ssid, &self.wifi.pwd);
                    Some(LinkState::Reconnecting {
                        last_attempt_ms: now_ms,
                        attempts: attempts + 1,
                    })
                } else {
                    None
                }
            }
        };

        if let Some(state) = next {
            if state == LinkState::Connected {
                let info = self.link.info();
                tracing::info!("Connected to {:?}, IP address {}", info.ssid, info.ip);
            }
            self.state = state;
        }
        next
    }
}

/// Link for a host whose networking is managed by the operating system.
///
/// It is always associated; `ip` is the address the HTTP server is bound to.
#[derive(Clone, Debug)]
pub struct HostLink {
    ip: IpAddr,
    ssid: String,
}

impl HostLink {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            ssid: String::new(),
        }
    }
}

impl NetworkLink for HostLink {
    fn begin(&mut self, ssid: &str, _password: &str) {
        self.ssid = ssid.to_string();
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn start_access_point(&mut self, hostname: &str) {
        tracing::warn!("Access point mode is not available on this host ({})", hostname);
    }

    fn info(&self) -> LinkInfo {
        LinkInfo {
            ip: self.ip.to_string(),
            ssid: self.ssid.clone(),
            mac: String::new(),
            rssi: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    #[derive(Default)]
    struct ScriptedLink {
        connected: bool,
        begins: u32,
        access_point: bool,
    }

    impl NetworkLink for ScriptedLink {
        fn begin(&mut self, _ssid: &str, _password: &str) {
            self.begins += 1;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn start_access_point(&mut self, _hostname: &str) {
            self.access_point = true;
        }

        fn info(&self) -> LinkInfo {
            LinkInfo::default()
        }
    }

    fn supervisor(timeout: u32) -> LinkSupervisor<ScriptedLink> {
        let wifi = WifiConfig {
            ssid: "home".to_string(),
            timeout,
            ..WifiConfig::default()
        };
        LinkSupervisor::new(ScriptedLink::default(), wifi)
    }

    #[test]
    fn idle_until_started() {
        let mut sup = supervisor(1000);
        assert_eq!(sup.tick(10_000), None);
        assert_eq!(sup.link().begins, 0);
    }

    #[test]
    fn connects_within_timeout() {
        let mut sup = supervisor(1000);
        sup.start(0);
        assert_eq!(sup.tick(500), None);
        sup.link.connected = true;
        assert_eq!(sup.tick(600), Some(LinkState::Connected));
        assert_eq!(sup.link().begins, 1);
    }

    #[test]
    fn falls_back_to_access_point_after_timeout() {
        let mut sup = supervisor(1000);
        sup.start(0);
        assert_eq!(sup.tick(999), None);
        assert_eq!(sup.tick(1000), Some(LinkState::AccessPoint));
        assert!(sup.link().access_point);

        // No more association attempts once in access-point mode.
        sup.tick(50_000);
        assert_eq!(sup.link().begins, 1);
    }

    #[test]
    fn reconnects_with_fixed_backoff() {
        let mut sup = supervisor(1000);
        sup.start(0);
        sup.link.connected = true;
        sup.tick(10);

        sup.link.connected = false;
        assert_eq!(
            sup.tick(100),
            Some(LinkState::Reconnecting {
                last_attempt_ms: 100,
                attempts: 1
            })
        );
        assert_eq!(sup.link().begins, 2);

        assert_eq!(sup.tick(100 + RECONNECT_BACKOFF_MS - 1), None);
        assert_eq!(
            sup.tick(100 + RECONNECT_BACKOFF_MS),
            Some(LinkState::Reconnecting {
                last_attempt_ms: 100 + RECONNECT_BACKOFF_MS,
                attempts: 2
            })
        );
        assert_eq!(sup.link().begins, 3);

        sup.link.connected = true;
        assert_eq!(sup.tick(6000), Some(LinkState::Connected));
    }

    #[test]
    fn host_link_is_always_connected() {
        let mut sup = LinkSupervisor::new(
            HostLink::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
            WifiConfig {
                ssid: "home".to_string(),
                ..WifiConfig::default()
            },
        );
        sup.start(0);
        assert_eq!(sup.tick(1), Some(LinkState::Connected));

        let info = sup.link().info();
        assert_eq!(info.ip, "192.168.1.20");
        assert_eq!(info.ssid, "home");
    }
}
