//! Command-line interface and environment overrides.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{LogFormat, ProxyConfig};

/// Identity-aware mTLS reverse proxy
#[derive(Parser, Debug, Default)]
#[command(name = "authz-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "AUTHZ_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to accept mTLS connections on
    #[arg(long, env = "BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Upstream address (tcp://host:port, tcp4://, tcp6:// or unix:///path)
    #[arg(long, env = "UPSTREAM_ADDR")]
    pub upstream_addr: Option<String>,

    /// Authorization rules file (.hcl, .conf or .json)
    #[arg(long, env = "AUTHZ_CONFIG")]
    pub authz_config: Option<String>,

    /// Server certificate (PEM)
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<String>,

    /// Server private key (PEM)
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<String>,

    /// CA bundle for client certificates (PEM)
    #[arg(long, env = "TLS_CLIENT_CA")]
    pub tls_client_ca: Option<String>,

    /// Health/status server address
    #[arg(long, env = "META_ADDR")]
    pub meta_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Prometheus endpoint address; setting it enables metrics
    #[arg(long, env = "METRICS_ADDR")]
    pub metrics_addr: Option<String>,

    /// Disable automatic reload when the rules file changes
    #[arg(long)]
    pub no_watch: bool,
}

impl Cli {
    /// Overlay every flag or variable that was set onto `config`.
    pub fn apply(&self, config: &mut ProxyConfig) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }

        set(&mut config.listener.bind_address, &self.bind_addr);
        set(&mut config.upstream.address, &self.upstream_addr);
        set(&mut config.authz.path, &self.authz_config);
        set(&mut config.listener.tls.cert_path, &self.tls_cert);
        set(&mut config.listener.tls.key_path, &self.tls_key);
        set(&mut config.listener.tls.client_ca_path, &self.tls_client_ca);
        set(&mut config.meta.bind_address, &self.meta_addr);
        set(&mut config.observability.log_level, &self.log_level);

        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if let Some(addr) = &self.metrics_addr {
            config.observability.metrics_address.clone_from(addr);
            config.observability.metrics_enabled = true;
        }
        if self.no_watch {
            config.authz.watch = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "authz-proxy",
            "--bind-addr",
            "127.0.0.1:9443",
            "--upstream-addr",
            "unix:///run/app.sock",
            "--authz-config",
            "rules.json",
            "--log-format",
            "pretty",
            "--metrics-addr",
            "127.0.0.1:9090",
            "--no-watch",
        ])
        .unwrap();

        let mut config = ProxyConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.listener.bind_address, "127.0.0.1:9443");
        assert_eq!(config.upstream.address, "unix:///run/app.sock");
        assert_eq!(config.authz.path, "rules.json");
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(config.observability.metrics_enabled);
        assert!(!config.authz.watch);
        // Untouched values keep their defaults.
        assert_eq!(config.meta.bind_address, "0.0.0.0:8081");
    }

    #[test]
    fn unset_flags_leave_config_alone() {
        let mut config = ProxyConfig::default();
        config.upstream.address = "tcp://10.0.0.1:80".into();
        Cli::default().apply(&mut config);
        assert_eq!(config.upstream.address, "tcp://10.0.0.1:80");
    }

    #[test]
    fn bad_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["authz-proxy", "--log-format", "xml"]).is_err());
    }
}
