use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::{RouteInfo, RouteTarget, RouterAdapter};
use crate::docker::ContainerDetails;
use crate::error::Result;

/// DNS labels are capped at 63 octets.
const MAX_SUBDOMAIN_LEN: usize = 63;

static HOST_RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(`([^`]+)`\)").expect("host rule regex must compile"));

/// Routes through a label-driven reverse proxy (Traefik conventions).
/// No host port is published; the proxy resolves the hostname.
pub struct ProxyRouter {
    base_domain: String,
    scheme: String,
    entrypoints: String,
    cert_resolver: Option<String>,
    network: Option<String>,
}

/// Subdomain for a preview slug, shortened to a DNS label when needed.
/// The slug ends in its key hash, which is kept on truncation.
pub fn subdomain_for(slug: &str) -> String {
    if slug.len() <= MAX_SUBDOMAIN_LEN {
        return slug.to_string();
    }
    let (prefix, hash) = slug.rsplit_once('-').unwrap_or((slug, ""));
    let keep = MAX_SUBDOMAIN_LEN - hash.len() - 1;
    let prefix: String = prefix.chars().take(keep).collect();
    format!("{}-{}", prefix.trim_end_matches(['-', '.', '_']), hash)
}

impl ProxyRouter {
    pub fn new(
        base_domain: String,
        scheme: String,
        entrypoints: String,
        cert_resolver: Option<String>,
        network: Option<String>,
    ) -> Self {
        Self {
            base_domain: base_domain.trim_matches('.').to_string(),
            scheme,
            entrypoints,
            cert_resolver,
            network,
        }
    }

    fn labels(&self, router: &str, hostname: &str, port: u16) -> HashMap<String, String> {
        let mut labels = HashMap::from([
            ("traefik.enable".to_string(), "true".to_string()),
            (
                format!("traefik.http.routers.{router}.rule"),
                format!("Host(`{hostname}`)"),
            ),
            (
                format!("traefik.http.routers.{router}.entrypoints"),
                self.entrypoints.clone(),
            ),
            (
                format!("traefik.http.services.{router}.loadbalancer.server.port"),
                port.to_string(),
            ),
        ]);
        if self.scheme == "https" {
            labels.insert(format!("traefik.http.routers.{router}.tls"), "true".to_string());
        }
        if let Some(resolver) = &self.cert_resolver {
            labels.insert(
                format!("traefik.http.routers.{router}.tls.certresolver"),
                resolver.clone(),
            );
        }
        if let Some(network) = &self.network {
            labels.insert("traefik.docker.network".to_string(), network.clone());
        }
        labels
    }
}

#[async_trait]
impl RouterAdapter for ProxyRouter {
    async fn prepare_run(&self, target: &RouteTarget) -> Result<RouteInfo> {
        let hostname = format!("{}.{}", subdomain_for(&target.slug), self.base_domain);
        let labels = self.labels(&target.container_name, &hostname, target.container_port);
        Ok(RouteInfo::Proxy {
            url: format!("{}://{}", self.scheme, hostname),
            labels,
            network: self.network.clone(),
        })
    }

    fn get_container_url(&self, container: &ContainerDetails, _container_port: u16) -> Option<String> {
        let rule_key = format!("traefik.http.routers.{}.rule", container.name);
        let rule = container.labels.get(&rule_key).or_else(|| {
            container
                .labels
                .iter()
                .find(|(k, _)| k.starts_with("traefik.http.routers.") && k.ends_with(".rule"))
                .map(|(_, v)| v)
        })?;
        let host = HOST_RULE_RE.captures(rule)?.get(1)?.as_str();
        Some(format!("{}://{}", self.scheme, host))
    }

    fn kind(&self) -> &'static str {
        "proxy"
    }
}
