//! Routing config rendering.
//!
//! The rendered file is a complete standalone nginx configuration so
//! it can be syntax-checked in isolation with `nginx -t -c <file>`.
//! Three routing rules: a direct upstream-bypassing path to the
//! instance health endpoint, a restricted metrics path, and the
//! primary proxy rule.

use sha2::{Digest, Sha256};

/// Inputs for rendering a routing config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSpec {
    /// Name of the upstream block.
    pub upstream: String,
    /// Port the proxy listens on.
    pub listen_port: u16,
    /// Host port of the slot that should receive primary traffic.
    pub upstream_port: u16,
    /// Health endpoint path on the instance.
    pub health_path: String,
    /// Restricted metrics path.
    pub metrics_path: String,
    /// Source addresses allowed on the metrics path.
    pub metrics_allow: Vec<String>,
}

/// A rendered routing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    text: String,
    upstream_port: u16,
}

impl RoutingConfig {
    pub fn render(spec: &RoutingSpec) -> Self {
        let allow_rules = spec
            .metrics_allow
            .iter()
            .map(|addr| format!("            allow {addr};\n"))
            .collect::<String>();

        let text = format!(
            "\
# Managed by cutover; rewritten on every deployment.
events {{
    worker_connections 1024;
}}

http {{
    upstream {upstream} {{
        server 127.0.0.1:{upstream_port};
    }}

    server {{
        listen {listen_port};

        # Health checks go straight to the instance, bypassing the upstream.
        location = {health_path} {{
            proxy_pass http://127.0.0.1:{upstream_port}{health_path};
            proxy_connect_timeout 2s;
            proxy_read_timeout 5s;
        }}

        location = {metrics_path} {{
{allow_rules}            deny all;
            proxy_pass http://{upstream};
        }}

        location / {{
            proxy_pass http://{upstream};
            proxy_set_header Host $host;
            proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        }}
    }}
}}
",
            upstream = spec.upstream,
            upstream_port = spec.upstream_port,
            listen_port = spec.listen_port,
            health_path = spec.health_path,
            metrics_path = spec.metrics_path,
            allow_rules = allow_rules,
        );

        Self {
            text,
            upstream_port: spec.upstream_port,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn upstream_port(&self) -> u16 {
        self.upstream_port
    }

    /// SHA-256 of the rendered text.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.text)
    }
}

/// SHA-256 hex digest of config text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
