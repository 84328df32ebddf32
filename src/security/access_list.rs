//! Access list evaluation.
//!
//! An access list carries two independent gates that are never merged:
//!
//! ```text
//! request
//!     → network gate (exact-ip / cidr rules, deny beats allow)
//!     → credential gate (basic-auth rules, only if the list has any)
//!     → admitted
//! ```
//!
//! Rules are evaluated against a snapshot of the list taken for the request.

use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::directory::{DirectoryError, PasswordVerifier};
use crate::error::AdmissionError;

/// What a rule matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    ExactIp,
    Cidr,
    Credential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directive {
    Allow,
    Deny,
}

/// A single access list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub kind: RuleKind,
    #[serde(default = "default_directive")]
    pub directive: Directive,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_directive() -> Directive {
    Directive::Allow
}

fn default_enabled() -> bool {
    true
}

impl AccessRule {
    pub fn ip(directive: Directive, address: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::ExactIp,
            directive,
            address: Some(address.into()),
            subnet: None,
            username: None,
            password_hash: None,
            enabled: true,
        }
    }

    pub fn cidr(directive: Directive, subnet: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Cidr,
            directive,
            address: None,
            subnet: Some(subnet.into()),
            username: None,
            password_hash: None,
            enabled: true,
        }
    }

    pub fn credential(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Credential,
            directive: Directive::Allow,
            address: None,
            subnet: None,
            username: Some(username.into()),
            password_hash: Some(password_hash.into()),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn is_network_rule(&self) -> bool {
        matches!(self.kind, RuleKind::ExactIp | RuleKind::Cidr)
    }

    /// Whether this network rule covers `candidate`. Unparseable rules never match.
    fn matches_address(&self, candidate: IpAddr) -> bool {
        match self.kind {
            RuleKind::ExactIp => match self.address.as_deref().map(parse_address) {
                Some(Some(address)) => address == candidate,
                _ => {
                    tracing::warn!(address = ?self.address, "Ignoring access rule with invalid address");
                    false
                }
            },
            RuleKind::Cidr => match self.subnet.as_deref().and_then(parse_subnet) {
                Some(net) => net.contains(&candidate),
                None => {
                    tracing::warn!(subnet = ?self.subnet, "Ignoring access rule with invalid subnet");
                    false
                }
            },
            RuleKind::Credential => false,
        }
    }
}

/// An ordered set of rules, owned by a console user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessList {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

impl AccessList {
    pub fn new(id: i64, owner_id: impl Into<String>, rules: Vec<AccessRule>) -> Self {
        Self {
            id,
            name: String::new(),
            owner_id: owner_id.into(),
            rules,
        }
    }

    /// True if any enabled credential rule exists.
    pub fn requires_credentials(&self) -> bool {
        self.rules
            .iter()
            .any(|r| r.enabled && r.kind == RuleKind::Credential)
    }
}

/// Evaluate the network gate for a textual candidate address.
///
/// Fails with [`AdmissionError::MalformedAddress`] if `candidate` does not parse.
pub fn check_ip_access(list: &AccessList, candidate: &str) -> Result<bool, AdmissionError> {
    let address = parse_address(candidate)
        .ok_or_else(|| AdmissionError::MalformedAddress(candidate.to_string()))?;
    Ok(check_ip_access_addr(list, address))
}

/// Evaluate the network gate for a parsed address.
///
/// Any matching deny wins no matter where the allow matches sit. When nothing
/// matches, or only allow rules match, the candidate is allowed. A list made
/// only of allow rules that miss the candidate therefore does not deny it.
pub fn check_ip_access_addr(list: &AccessList, candidate: IpAddr) -> bool {
    let candidate = candidate.to_canonical();

    let denied = list
        .rules
        .iter()
        .filter(|r| r.enabled && r.is_network_rule() && r.directive == Directive::Deny)
        .any(|r| r.matches_address(candidate));
    if denied {
        tracing::debug!(list_id = list.id, candidate = %candidate, "Access list deny matched");
        return false;
    }

    // Default allow: a matching allow and no match at all are treated alike.
    true
}

/// Username and password presented with `Proxy-Authorization: Basic`.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    /// Parse a `Basic <base64(user:pass)>` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Evaluate the credential gate.
///
/// Lists without enabled credential rules pass. Otherwise the presented
/// credentials must match an enabled rule's username and password hash.
pub async fn check_credentials(
    list: &AccessList,
    presented: Option<&BasicCredentials>,
    verifier: &dyn PasswordVerifier,
) -> Result<bool, DirectoryError> {
    if !list.requires_credentials() {
        return Ok(true);
    }

    let Some(presented) = presented else {
        return Ok(false);
    };

    let candidates = list.rules.iter().filter(|r| {
        r.enabled
            && r.kind == RuleKind::Credential
            && r.username.as_deref() == Some(presented.username.as_str())
    });

    for rule in candidates {
        let Some(hash) = rule.password_hash.as_deref() else {
            continue;
        };
        if verifier.verify(&presented.password, hash).await? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn parse_address(s: &str) -> Option<IpAddr> {
    s.trim().parse::<IpAddr>().ok().map(|ip| ip.to_canonical())
}

fn parse_subnet(s: &str) -> Option<IpNet> {
    let s = s.trim();
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net.trunc());
    }
    // A bare address is a single-host network.
    let ip = parse_address(s)?;
    let prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, prefix).ok()
}
