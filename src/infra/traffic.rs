//! Load balancer traffic rules

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
            Protocol::Tcp => 80,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Https => "https",
            _ => "http",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    Http1,
    Http2,
    Grpc,
}

/// One side of a traffic rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<ProtocolVersion>,

    /// Expected answer when checked: HTTP status or `grpc-status`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_path: Option<String>,
}

impl TrafficPoint {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    pub fn is_grpc(&self) -> bool {
        self.protocol_version == Some(ProtocolVersion::Grpc)
    }

    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "port": self.port,
            "protocol": self.protocol,
        });
        if let Some(version) = self.protocol_version {
            value["protocol_version"] = json!(version);
        }
        if let Some(status) = &self.status_code {
            value["status_code"] = json!(status);
        }
        if let Some(path) = &self.health_check_path {
            value["health_check_path"] = json!(path);
        }
        value
    }
}

/// Listener to target mapping on the load balancer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct TrafficRule {
    pub listener: TrafficPoint,
    pub target: TrafficPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<bool>,
}

#[derive(Deserialize)]
struct RawRule {
    listener: TrafficPoint,
    target: TrafficPoint,
    #[serde(default)]
    base: Option<bool>,
}

impl TryFrom<RawRule> for TrafficRule {
    type Error = ConfigError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        Self::new(raw.listener, raw.target).map(|rule| rule.with_base(raw.base))
    }
}

impl TrafficRule {
    /// gRPC targets must sit behind an HTTPS listener
    pub fn new(listener: TrafficPoint, target: TrafficPoint) -> Result<Self, ConfigError> {
        if target.is_grpc() && listener.protocol != Protocol::Https {
            return Err(ConfigError::invalid(
                "traffic",
                "a gRPC target requires an HTTPS listener",
            ));
        }
        if listener.protocol_version == Some(ProtocolVersion::Grpc) {
            return Err(ConfigError::invalid(
                "traffic",
                "gRPC is a target protocol version, not a listener one",
            ));
        }
        Ok(Self {
            listener,
            target,
            base: None,
        })
    }

    pub fn with_base(mut self, base: Option<bool>) -> Self {
        self.base = base;
        self
    }

    /// URL of the listener on `dns`
    pub fn listener_url(&self, dns: &str) -> String {
        let port = self.listener.effective_port();
        let scheme = self.listener.protocol.scheme();
        if port == self.listener.protocol.default_port() {
            format!("{scheme}://{dns}")
        } else {
            format!("{scheme}://{dns}:{port}")
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "listener": self.listener.to_value(),
            "target": self.target.to_value(),
            "base": self.base,
        })
    }
}
