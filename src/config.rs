//! Process-wide configuration, loaded once at startup from an INI-like
//! file and handed down explicitly into each component's constructor,
//! never through a module-level singleton. Section shape mirrors
//! `config.go`.

use ini::Ini;
use std::net::SocketAddr;

#[derive(Clone, Debug, Default)]
pub struct DefaultConfig {
    pub debug: bool,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub addr: SocketAddr,
    pub confirmations: usize,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub view_addr: SocketAddr,
    pub num_threads: usize,
}

#[derive(Clone, Debug)]
pub struct ViewServerConfig {
    pub addr: SocketAddr,
    pub controllers: Vec<SocketAddr>,
}

#[derive(Clone, Debug, Default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub username: String,
    pub password: String,
    pub admin: String,
}

#[derive(Clone, Debug, Default)]
pub struct DnsConfig {
    pub server: String,
}

#[derive(Clone, Debug, Default)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub default: DefaultConfig,
    pub controller: Option<ControllerConfig>,
    pub worker: Option<WorkerConfig>,
    pub view_server: Option<ViewServerConfig>,
    pub smtp: SmtpConfig,
    pub dns: DnsConfig,
    pub twilio: TwilioConfig,
}

/// Which role this process should run. Exactly one of `controller.addr`
/// and `view_server.addr` must be set per process.
pub enum Role<'a> {
    Controller(&'a ControllerConfig),
    ViewServer(&'a ViewServerConfig),
}

impl Config {
    pub fn role(&self) -> Result<Role<'_>, String> {
        match (&self.controller, &self.view_server) {
            (Some(c), None) => Ok(Role::Controller(c)),
            (None, Some(v)) => Ok(Role::ViewServer(v)),
            (Some(_), Some(_)) => Err(
                "both controller.addr and view_server.addr are set; \
                 you should not run both on the same instance"
                    .to_string(),
            ),
            (None, None) => Err("neither controller.addr nor view_server.addr is set".to_string()),
        }
    }

    pub fn parse(text: &str) -> Result<Config, String> {
        let ini = Ini::load_from_str(text).map_err(|e| e.to_string())?;

        let default = ini
            .section(Some("default"))
            .map(|s| DefaultConfig {
                debug: s.get("debug").map(|v| v == "true" || v == "1").unwrap_or(false),
                password: s.get("password").unwrap_or_default().to_string(),
            })
            .unwrap_or_default();

        let controller = match ini.section(Some("controller")) {
            Some(s) if !s.get("addr").unwrap_or_default().is_empty() => Some(ControllerConfig {
                addr: parse_addr(s.get("addr").unwrap(), "controller.addr")?,
                confirmations: s
                    .get("confirmations")
                    .map(|v| v.parse().map_err(|_| "controller.confirmations must be an integer".to_string()))
                    .transpose()?
                    .unwrap_or(1),
            }),
            _ => None,
        };

        let worker = match ini.section(Some("worker")) {
            Some(s) if !s.get("view_addr").unwrap_or_default().is_empty() => Some(WorkerConfig {
                view_addr: parse_addr(s.get("view_addr").unwrap(), "worker.view_addr")?,
                num_threads: s
                    .get("num_threads")
                    .map(|v| v.parse().map_err(|_| "worker.num_threads must be an integer".to_string()))
                    .transpose()?
                    .unwrap_or(4),
            }),
            _ => None,
        };

        let view_server = match ini.section(Some("view_server")) {
            Some(s) if !s.get("addr").unwrap_or_default().is_empty() => {
                let controllers = s
                    .get_all("controller")
                    .map(|a| parse_addr(a, "view_server.controller"))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(ViewServerConfig { addr: parse_addr(s.get("addr").unwrap(), "view_server.addr")?, controllers })
            }
            _ => None,
        };

        let smtp = ini
            .section(Some("smtp"))
            .map(|s| SmtpConfig {
                host: s.get("host").unwrap_or_default().to_string(),
                port: s.get("port").and_then(|v| v.parse().ok()).unwrap_or(25),
                from: s.get("from").unwrap_or_default().to_string(),
                username: s.get("username").unwrap_or_default().to_string(),
                password: s.get("password").unwrap_or_default().to_string(),
                admin: s.get("admin").unwrap_or_default().to_string(),
            })
            .unwrap_or_default();

        let dns = ini
            .section(Some("dns"))
            .map(|s| DnsConfig { server: s.get("server").unwrap_or_default().to_string() })
            .unwrap_or_default();

        let twilio = ini
            .section(Some("twilio"))
            .map(|s| TwilioConfig {
                account_sid: s.get("account_sid").unwrap_or_default().to_string(),
                auth_token: s.get("auth_token").unwrap_or_default().to_string(),
                from: s.get("from").unwrap_or_default().to_string(),
            })
            .unwrap_or_default();

        Ok(Config { default, controller, worker, view_server, smtp, dns, twilio })
    }
}

fn parse_addr(raw: &str, field: &str) -> Result<SocketAddr, String> {
    raw.parse().map_err(|_| format!("{field}: invalid socket address {raw:?}"))
}
