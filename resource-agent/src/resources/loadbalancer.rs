//! Load balancers fronting a pool of network interfaces.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind, validate_name};
use crate::error::{Error, Result};
use crate::store::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancingRule {
    pub protocol: Protocol,
    pub frontend_port: u16,
    pub backend_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_ip: Option<String>,
    /// Names of NetworkInterface resources in the backend pool.
    #[serde(default)]
    pub backends: Vec<String>,
    pub rules: Vec<LoadBalancingRule>,
}

impl Resource for LoadBalancer {
    const KIND: ResourceKind = ResourceKind::LoadBalancer;

    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.name)?;

        if let Some(ip) = &self.frontend_ip {
            ip.parse::<IpAddr>()
                .map_err(|_| Error::InvalidInput(format!("invalid frontend IP: {}", ip)))?;
        }

        if self.rules.is_empty() {
            return Err(Error::InvalidInput(format!(
                "load balancer '{}' needs at least one rule",
                self.name
            )));
        }

        let mut frontends = HashSet::new();
        for rule in &self.rules {
            if rule.frontend_port == 0 || rule.backend_port == 0 {
                return Err(Error::InvalidInput(format!(
                    "load balancer '{}' has a rule with port 0",
                    self.name
                )));
            }
            if !frontends.insert((rule.protocol, rule.frontend_port)) {
                return Err(Error::InvalidInput(format!(
                    "load balancer '{}' has more than one rule for {:?} port {}",
                    self.name, rule.protocol, rule.frontend_port
                )));
            }
        }

        if self.backends.iter().any(|b| b.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "load balancer '{}' has an empty backend name",
                self.name
            )));
        }

        Ok(())
    }

    fn field(&self, field: &str) -> FieldValue<'_> {
        match field {
            "frontend_ip" => FieldValue::Str(self.frontend_ip.as_deref()),
            "backends" | "rules" => FieldValue::NotString,
            _ => FieldValue::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lb() -> LoadBalancer {
        LoadBalancer {
            name: "web".to_string(),
            frontend_ip: Some("192.0.2.10".to_string()),
            backends: vec!["nic-a".to_string(), "nic-b".to_string()],
            rules: vec![LoadBalancingRule {
                protocol: Protocol::Tcp,
                frontend_port: 80,
                backend_port: 8080,
            }],
        }
    }

    #[test]
    fn test_valid() {
        assert!(lb().validate().is_ok());
    }

    #[test]
    fn test_rules_required() {
        let mut lb = lb();
        lb.rules.clear();
        assert!(matches!(lb.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_conflicting_frontend_ports() {
        let mut lb = lb();
        lb.rules.push(LoadBalancingRule {
            protocol: Protocol::Tcp,
            frontend_port: 80,
            backend_port: 9090,
        });
        assert!(lb.validate().is_err());

        // Same port on another protocol is fine.
        lb.rules[1].protocol = Protocol::Udp;
        assert!(lb.validate().is_ok());
    }

    #[test]
    fn test_bad_frontend_ip() {
        let mut lb = lb();
        lb.frontend_ip = Some("not-an-ip".to_string());
        assert!(matches!(lb.validate(), Err(Error::InvalidInput(_))));
    }
}
