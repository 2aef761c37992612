pub mod authority;

use crate::config::{NetworkProfile, SecurityConfig};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// URL admission and text sanitization. `network_profile = public` rejects
/// any host that resolves to a loopback/private/link-local/reserved
/// address (SSRF guard); `enterprise` allows those addresses through,
/// since enterprise deployments often crawl internal documentation.
pub struct SecurityGuard {
    config: SecurityConfig,
}

impl SecurityGuard {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Admission check: domain allow/block lists, then (in the `public`
    /// network profile) an SSRF guard over the resolved address.
    pub async fn is_allowed_url(&self, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host_lower = host.to_ascii_lowercase();

        if self
            .config
            .blocked_domains
            .iter()
            .any(|d| host_lower.contains(d.to_ascii_lowercase().as_str()))
        {
            return false;
        }

        if !self.config.allowed_domains.is_empty()
            && !self
                .config
                .allowed_domains
                .iter()
                .any(|d| host_lower.contains(d.to_ascii_lowercase().as_str()))
        {
            return false;
        }

        if matches!(self.config.network_profile, NetworkProfile::Enterprise) {
            return true;
        }

        !self.resolves_to_private_address(host).await
    }

    async fn resolves_to_private_address(&self, host: &str) -> bool {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_or_reserved(ip);
        }
        let lookup = format!("{}:0", host);
        match tokio::net::lookup_host(lookup).await {
            Ok(addrs) => addrs
                .map(|sa| sa.ip())
                .any(is_private_or_reserved),
            // Unresolvable hosts fail closed: never fetch a URL we can't
            // confirm is public.
            Err(_) => true,
        }
    }

    /// Mask emails and phone numbers when `pii_masking` is enabled;
    /// otherwise returns the text unchanged.
    pub fn sanitize_text(&self, text: &str) -> String {
        if !self.config.pii_masking {
            return text.to_string();
        }

        let email_re = regex::Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("static email regex");
        let phone_re =
            regex::Regex::new(r"\b(\+?\d{1,2}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b")
                .expect("static phone regex");

        let masked = email_re.replace_all(text, "[EMAIL_REDACTED]");
        phone_re.replace_all(&masked, "[PHONE_REDACTED]").into_owned()
    }
}

fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_unspecified()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let segments = ip.segments();
    // fc00::/7 (unique local) and fe80::/10 (link-local) are never publicly
    // routable.
    (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn guard(profile: NetworkProfile) -> SecurityGuard {
        SecurityGuard::new(SecurityConfig {
            network_profile: profile,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn public_profile_rejects_loopback_ip_literal() {
        let g = guard(NetworkProfile::Public);
        assert!(!g.is_allowed_url("http://127.0.0.1/").await);
        assert!(!g.is_allowed_url("http://10.0.0.5/").await);
    }

    #[tokio::test]
    async fn public_profile_admits_public_ip_literal() {
        let g = guard(NetworkProfile::Public);
        assert!(g.is_allowed_url("http://8.8.8.8/").await);
    }

    #[tokio::test]
    async fn enterprise_profile_admits_private_ip_literal() {
        let g = guard(NetworkProfile::Enterprise);
        assert!(g.is_allowed_url("http://10.0.0.5/").await);
    }

    #[tokio::test]
    async fn blocked_domain_is_rejected_regardless_of_profile() {
        let g = SecurityGuard::new(SecurityConfig {
            blocked_domains: vec!["reddit.com".to_string()],
            network_profile: NetworkProfile::Enterprise,
            ..Default::default()
        });
        assert!(!g.is_allowed_url("http://www.reddit.com/r/rust").await);
    }

    #[test]
    fn sanitize_text_masks_email_and_phone() {
        let g = SecurityGuard::new(SecurityConfig::default());
        let out = g.sanitize_text("Contact me at jane@example.com or 555-123-4567.");
        assert!(out.contains("[EMAIL_REDACTED]"));
        assert!(out.contains("[PHONE_REDACTED]"));
    }

    #[test]
    fn sanitize_text_noop_when_masking_disabled() {
        let g = SecurityGuard::new(SecurityConfig {
            pii_masking: false,
            ..Default::default()
        });
        let text = "jane@example.com";
        assert_eq!(g.sanitize_text(text), text);
    }
}
