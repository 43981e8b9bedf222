// src/topology/mod.rs

//! Proxy and balancer configuration rendered from one topology
//!
//! Both artifacts come out of a single in-memory `Topology` so their ports
//! and path prefixes cannot drift apart. Routing predicates are tested in a
//! fixed priority order: the websocket upgrade header first, then the media
//! and pixel path prefixes, with unmatched requests falling to the default
//! application backend. The previous balancer config is preserved to a
//! timestamped side location before overwrite; this is the pipeline's only
//! backup affordance. Rendered services restart once, after both files are
//! written, never mid-render.

use crate::env::HostEnvironment;
use crate::error::{Error, Result};
use crate::pipeline::{Context, Stage};
use crate::supervisor::AUX_SERVICES;
use chrono::Utc;
use tracing::{debug, info};

pub const BALANCER_PORT: u16 = 80;
pub const APP_PORT: u16 = 8001;
pub const WEBSOCKETS_PORT: u16 = 8002;
pub const MEDIA_PORT: u16 = 9000;
pub const PIXEL_PORT: u16 = 8082;

pub const PROXY_UNIT: &str = "nginx";
pub const BALANCER_UNIT: &str = "haproxy";

/// How requests are matched to a backend, first match wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePredicate {
    /// Connection upgrade header (websockets)
    UpgradeHeader,
    /// Request path prefix
    PathPrefix(&'static str),
    /// Fallback for unmatched requests
    Default,
}

/// Which process actually serves a backend's port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedBy {
    /// A server block in the proxy config
    Proxy,
    /// An auxiliary supervised service
    Auxiliary,
    /// The application layer itself
    Application,
}

#[derive(Debug, Clone)]
pub struct Backend {
    pub name: &'static str,
    pub port: u16,
    pub predicate: RoutePredicate,
    pub served_by: ServedBy,
}

/// The single source of truth both artifacts are rendered from
#[derive(Debug, Clone)]
pub struct Topology {
    pub domain: String,
    pub media_root: std::path::PathBuf,
    /// Backends in routing priority order; the default backend is last
    pub backends: Vec<Backend>,
}

impl Topology {
    /// The fixed backend set, in routing priority order
    pub fn for_env(env: &HostEnvironment) -> Self {
        Self {
            domain: env.domain.clone(),
            media_root: env.layout.media_root.clone(),
            backends: vec![
                Backend {
                    name: "websockets",
                    port: WEBSOCKETS_PORT,
                    predicate: RoutePredicate::UpgradeHeader,
                    served_by: ServedBy::Auxiliary,
                },
                Backend {
                    name: "media",
                    port: MEDIA_PORT,
                    predicate: RoutePredicate::PathPrefix("/media/"),
                    served_by: ServedBy::Proxy,
                },
                Backend {
                    name: "pixel",
                    port: PIXEL_PORT,
                    predicate: RoutePredicate::PathPrefix("/pixel/"),
                    served_by: ServedBy::Proxy,
                },
                Backend {
                    name: "app",
                    port: APP_PORT,
                    predicate: RoutePredicate::Default,
                    served_by: ServedBy::Application,
                },
            ],
        }
    }

    /// Ports the proxy config listens on
    pub fn proxy_ports(&self) -> Vec<u16> {
        self.backends
            .iter()
            .filter(|b| b.served_by == ServedBy::Proxy)
            .map(|b| b.port)
            .collect()
    }

    /// Every balancer-referenced port must be served by the proxy, an
    /// auxiliary service, or the application bind port; exactly one
    /// default backend, and it must be last in priority order.
    pub fn verify(&self) -> Result<()> {
        let proxy_ports = self.proxy_ports();
        for backend in &self.backends {
            let served = match backend.served_by {
                ServedBy::Proxy => proxy_ports.contains(&backend.port),
                ServedBy::Auxiliary => AUX_SERVICES.iter().any(|s| s.port == backend.port),
                ServedBy::Application => backend.port == APP_PORT,
            };
            if !served {
                return Err(Error::Topology(format!(
                    "backend {} routes to port {} which nothing serves",
                    backend.name, backend.port
                )));
            }
        }

        let defaults: Vec<_> = self
            .backends
            .iter()
            .filter(|b| b.predicate == RoutePredicate::Default)
            .collect();
        if defaults.len() != 1 {
            return Err(Error::Topology(format!(
                "expected exactly one default backend, found {}",
                defaults.len()
            )));
        }
        if self.backends.last().map(|b| &b.predicate) != Some(&RoutePredicate::Default) {
            return Err(Error::Topology(
                "default backend must be last in priority order".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the reverse proxy configuration (media and pixel servers)
    pub fn render_proxy(&self) -> String {
        let mut out = String::from("# generated by drydock\n");
        for backend in self.backends.iter().filter(|b| b.served_by == ServedBy::Proxy) {
            match backend.name {
                "media" => out.push_str(&format!(
                    "\
server {{
    listen {port};
    server_name media.{domain};
    expires max;
    location / {{
        root {media_root};
    }}
}}
",
                    port = backend.port,
                    domain = self.domain,
                    media_root = self.media_root.display(),
                )),
                "pixel" => out.push_str(&format!(
                    "\
server {{
    listen {port};
    server_name pixel.{domain};
    access_log /var/log/nginx/pixel.access.log;
    location / {{
        empty_gif;
    }}
}}
",
                    port = backend.port,
                    domain = self.domain,
                )),
                other => out.push_str(&format!(
                    "\
server {{
    listen {port};
    server_name {name}.{domain};
    location / {{
        proxy_pass http://127.0.0.1:{port};
    }}
}}
",
                    port = backend.port,
                    name = other,
                    domain = self.domain,
                )),
            }
        }
        out
    }

    /// Render the load balancer configuration
    pub fn render_balancer(&self) -> String {
        let mut out = format!(
            "\
# generated by drydock
global
    maxconn 350

defaults
    mode http
    timeout connect 5s
    timeout client 30s
    timeout server 30s

frontend main
    bind *:{}
    option httpclose
    option forwardfor
",
            BALANCER_PORT
        );

        // Protocol/header rewriting first, then one ACL per backend in
        // priority order; first match wins.
        for backend in &self.backends {
            match &backend.predicate {
                RoutePredicate::UpgradeHeader => {
                    out.push_str(&format!(
                        "    acl is_{name} hdr(Upgrade) -i websocket\n    use_backend {name} if is_{name}\n",
                        name = backend.name
                    ));
                }
                RoutePredicate::PathPrefix(prefix) => {
                    out.push_str(&format!(
                        "    acl is_{name} path_beg {prefix}\n    use_backend {name} if is_{name}\n",
                        name = backend.name,
                        prefix = prefix
                    ));
                }
                RoutePredicate::Default => {
                    out.push_str(&format!("    default_backend {}\n", backend.name));
                }
            }
        }

        for backend in &self.backends {
            out.push_str(&format!(
                "\nbackend {name}\n    server {name}0 127.0.0.1:{port} maxconn 100\n",
                name = backend.name,
                port = backend.port
            ));
        }
        out
    }
}

/// Write both artifacts, preserving the prior balancer config first, then
/// restart the rendered services once.
pub fn install(ctx: &mut Context) -> Result<()> {
    let env = ctx.env;
    let topology = Topology::for_env(env);
    topology.verify()?;

    let proxy_path = &env.layout.proxy_config;
    let balancer_path = &env.layout.balancer_config;
    if let Some(parent) = proxy_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = balancer_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(proxy_path, topology.render_proxy())?;

    if balancer_path.is_file() {
        let backup = balancer_path.with_extension(format!(
            "cfg.bak.{}",
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        debug!("preserving previous balancer config to {}", backup.display());
        std::fs::copy(balancer_path, &backup)?;
    }
    std::fs::write(balancer_path, topology.render_balancer())?;

    info!("topology artifacts written; restarting rendered services");
    ctx.host.restart_service(PROXY_UNIT)?;
    ctx.host.restart_service(BALANCER_UNIT)?;
    Ok(())
}

pub struct TopologyStage;

impl Stage for TopologyStage {
    fn name(&self) -> &'static str {
        "topology"
    }

    fn is_satisfied(&self, ctx: &mut Context) -> Result<bool> {
        let topology = Topology::for_env(ctx.env);
        let current = |path: &std::path::Path| std::fs::read_to_string(path).unwrap_or_default();
        Ok(current(&ctx.env.layout.proxy_config) == topology.render_proxy()
            && current(&ctx.env.layout.balancer_config) == topology.render_balancer())
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        install(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::env::{HostEnvironment, Layout};

    fn env(root: &std::path::Path) -> HostEnvironment {
        let mut config = ProvisionConfig::default();
        config.install_root = root.to_path_buf();
        HostEnvironment::with_layout(config, Layout::rooted(root))
    }

    #[test]
    fn test_verify_accepts_standard_topology() {
        let temp = tempfile::tempdir().unwrap();
        Topology::for_env(&env(temp.path())).verify().unwrap();
    }

    #[test]
    fn test_verify_rejects_unserved_port() {
        let temp = tempfile::tempdir().unwrap();
        let mut topology = Topology::for_env(&env(temp.path()));
        topology.backends[0].port = 12345; // no auxiliary service there
        assert!(matches!(topology.verify(), Err(Error::Topology(_))));
    }

    #[test]
    fn test_verify_rejects_default_not_last() {
        let temp = tempfile::tempdir().unwrap();
        let mut topology = Topology::for_env(&env(temp.path()));
        topology.backends.swap(0, 3);
        assert!(topology.verify().is_err());
    }

    #[test]
    fn test_rendered_ports_agree() {
        let temp = tempfile::tempdir().unwrap();
        let topology = Topology::for_env(&env(temp.path()));
        let proxy = topology.render_proxy();
        let balancer = topology.render_balancer();

        for backend in topology
            .backends
            .iter()
            .filter(|b| b.served_by == ServedBy::Proxy)
        {
            assert!(proxy.contains(&format!("listen {};", backend.port)));
            assert!(balancer.contains(&format!("127.0.0.1:{}", backend.port)));
        }
    }

    #[test]
    fn test_balancer_priority_order() {
        let temp = tempfile::tempdir().unwrap();
        let balancer = Topology::for_env(&env(temp.path())).render_balancer();
        let websocket = balancer.find("use_backend websockets").unwrap();
        let media = balancer.find("use_backend media").unwrap();
        let pixel = balancer.find("use_backend pixel").unwrap();
        let fallback = balancer.find("default_backend app").unwrap();
        assert!(websocket < media && media < pixel && pixel < fallback);
    }
}
