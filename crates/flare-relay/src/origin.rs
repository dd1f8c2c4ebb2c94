//! Origin allow-list shared by the upgrade check and the CORS headers.

/// Which browser origins may use the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    any: bool,
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Build from a config list; `"*"` anywhere in it allows every origin.
    pub fn new(origins: &[String]) -> Self {
        Self {
            any: origins.iter().any(|o| o == "*"),
            allowed: origins
                .iter()
                .filter(|o| o.as_str() != "*")
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
        }
    }

    pub fn allows_any(&self) -> bool {
        self.any
    }

    /// Whether a request carrying `origin` may open a connection.
    ///
    /// Non-browser clients send no origin; they are only admitted when the
    /// policy is a wildcard.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.any {
            return true;
        }
        match origin {
            Some(o) => self.allowed.iter().any(|a| a == o.trim_end_matches('/')),
            None => false,
        }
    }

    /// Value for `Access-Control-Allow-Origin`, if any.
    pub fn allow_origin_header(&self, origin: Option<&str>) -> Option<String> {
        match origin {
            Some(o) if self.allows(Some(o)) => Some(o.to_string()),
            None if self.any => Some("*".to_string()),
            _ => None,
        }
    }
}

impl std::fmt::Display for OriginPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.any {
            write!(f, "*")
        } else {
            write!(f, "{}", self.allowed.join(", "))
        }
    }
}
