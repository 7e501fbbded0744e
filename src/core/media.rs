//! Media resolution before publishing.
//!
//! Platforms pull attached media by URL, so it has to be publicly reachable.
//! Loopback and private addresses are rejected without touching the network.
//! Media on our own CDN is re-hosted on a public image host; when every host
//! fails, a best-effort public variant of the original URL is used instead.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::adapters::{AssetFetcher, ImageHost};
use crate::config::MediaSettings;
use crate::domain::{MediaKind, MediaRef};

/// Where a media URL points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaClass {
    /// Not reachable from the public internet (or not a URL at all)
    Unreachable(String),
    /// Served from one of our own CDN hosts
    OwnCdn,
    Public,
}

/// Classify a media URL without any network access
pub fn classify(raw: &str, own_cdn_hosts: &[String]) -> MediaClass {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => return MediaClass::Unreachable(format!("invalid media URL: {}", e)),
    };

    if !matches!(url.scheme(), "http" | "https") {
        return MediaClass::Unreachable(format!("unsupported media URL scheme: {}", url.scheme()));
    }

    let private = match url.host() {
        None => true,
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local")
        }
        Some(Host::Ipv4(ip)) => is_private_v4(ip),
        Some(Host::Ipv6(ip)) => is_private_v6(ip),
    };
    if private {
        return MediaClass::Unreachable(format!("media URL is not publicly reachable: {}", raw));
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let on_cdn = own_cdn_hosts.iter().any(|h| {
        let h = h.to_ascii_lowercase();
        host == h || host.ends_with(&format!(".{}", h))
    });
    if on_cdn {
        MediaClass::OwnCdn
    } else {
        MediaClass::Public
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}

/// Outcome of resolving the attached media once per dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMedia {
    Public(MediaRef),
    Unreachable(String),
}

pub struct MediaResolver {
    fetcher: Arc<dyn AssetFetcher>,
    hosts: Vec<Arc<dyn ImageHost>>,
    settings: MediaSettings,
}

impl MediaResolver {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        hosts: Vec<Arc<dyn ImageHost>>,
        settings: MediaSettings,
    ) -> Self {
        Self {
            fetcher,
            hosts,
            settings,
        }
    }

    pub async fn resolve(&self, media: &MediaRef) -> ResolvedMedia {
        match classify(&media.url, &self.settings.own_cdn_hosts) {
            MediaClass::Unreachable(reason) => {
                debug!(url = %media.url, "Media rejected before dispatch");
                ResolvedMedia::Unreachable(reason)
            }
            MediaClass::Public => ResolvedMedia::Public(media.clone()),
            MediaClass::OwnCdn if media.kind == MediaKind::Video => {
                ResolvedMedia::Public(media.clone())
            }
            MediaClass::OwnCdn => ResolvedMedia::Public(MediaRef {
                url: self.rehost(&media.url).await,
                kind: media.kind,
            }),
        }
    }

    /// Primary host, then secondary, then the degraded URL
    async fn rehost(&self, url: &str) -> String {
        match self.fetcher.fetch(url).await {
            Ok(bytes) => {
                let encoded = STANDARD.encode(&bytes);
                for host in &self.hosts {
                    match host.upload(&encoded).await {
                        Ok(public) => {
                            info!(host = host.name(), %public, "Re-hosted media");
                            return public;
                        }
                        Err(e) => warn!(host = host.name(), error = %e, "Image host upload failed"),
                    }
                }
            }
            Err(e) => warn!(%url, error = %e, "Could not download media for re-hosting"),
        }

        let fallback = degraded_url(url, self.settings.public_base_url.as_deref());
        warn!(original = %url, %fallback, "Using degraded media URL");
        fallback
    }
}

/// Force https and swap in the configured public base host, if any
pub fn degraded_url(raw: &str, public_base: Option<&str>) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    if let Some(base) = public_base.and_then(|b| Url::parse(b).ok()) {
        let _ = url.set_scheme(base.scheme());
        let _ = url.set_host(base.host_str());
        let _ = url.set_port(base.port());
    } else {
        let _ = url.set_scheme("https");
    }
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_addresses() {
        for raw in [
            "http://localhost:3000/a.jpg",
            "http://127.0.0.1/a.jpg",
            "http://10.1.2.3/a.jpg",
            "http://192.168.0.4/a.jpg",
            "http://169.254.1.1/a.jpg",
            "http://[::1]/a.jpg",
            "http://[fd00::1]/a.jpg",
            "file:///tmp/a.jpg",
            "not a url",
        ] {
            assert!(
                matches!(classify(raw, &[]), MediaClass::Unreachable(_)),
                "{} should be unreachable",
                raw
            );
        }
    }

    #[test]
    fn test_own_cdn_and_public() {
        let cdn = vec!["cdn.example.com".to_string()];
        assert_eq!(
            classify("https://cdn.example.com/x.jpg", &cdn),
            MediaClass::OwnCdn
        );
        assert_eq!(
            classify("https://eu.cdn.example.com/x.jpg", &cdn),
            MediaClass::OwnCdn
        );
        assert_eq!(
            classify("https://images.example.org/x.jpg", &cdn),
            MediaClass::Public
        );
    }

    struct NoFetch;

    #[async_trait::async_trait]
    impl AssetFetcher for NoFetch {
        async fn fetch(&self, url: &str) -> crate::adapters::AdapterResult<Vec<u8>> {
            Err(crate::error::IntegrationError::NotFound(url.to_string()))
        }
    }

    fn resolver(public_base: Option<&str>) -> MediaResolver {
        MediaResolver::new(
            Arc::new(NoFetch),
            Vec::new(),
            MediaSettings {
                own_cdn_hosts: vec!["cdn.example.com".to_string()],
                public_base_url: public_base.map(str::to_string),
                ..MediaSettings::default()
            },
        )
    }

    #[test]
    fn test_cdn_video_kept_as_is() {
        let video = MediaRef::video("https://cdn.example.com/clip.mp4");
        let resolved = tokio_test::block_on(resolver(None).resolve(&video));
        assert_eq!(resolved, ResolvedMedia::Public(video));
    }

    #[test]
    fn test_failed_rehost_degrades() {
        let image = MediaRef::image("http://cdn.example.com/a.jpg");
        let resolved =
            tokio_test::block_on(resolver(Some("https://media.example.net")).resolve(&image));
        assert_eq!(
            resolved,
            ResolvedMedia::Public(MediaRef::image("https://media.example.net/a.jpg"))
        );
    }

    #[test]
    fn test_degraded_url() {
        assert_eq!(
            degraded_url("http://cdn.example.com/a/b.jpg?v=1", None),
            "https://cdn.example.com/a/b.jpg?v=1"
        );
        assert_eq!(
            degraded_url(
                "http://cdn.example.com:8080/a/b.jpg",
                Some("https://media.example.net")
            ),
            "https://media.example.net/a/b.jpg"
        );
    }
}
