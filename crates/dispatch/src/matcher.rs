use serde::Deserialize;

/// The type of match for an address rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchType {
    /// Matches an exact email address (e.g. "admin@example.com").
    ExactAddress,
    /// Matches all users at a domain (e.g. "example.com").
    Domain,
    /// Matches a domain and all its subdomains (e.g. "*.example.com").
    WildcardDomain,
}

/// A single rule deciding whether a recipient address is wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRule {
    pub match_type: MatchType,
    pub pattern: String,
}

impl AddressRule {
    pub fn new(match_type: MatchType, pattern: impl Into<String>) -> Self {
        Self {
            match_type,
            pattern: pattern.into(),
        }
    }

    /// Tests if this rule matches the given address.
    pub fn matches(&self, address: &str) -> bool {
        let address = address.trim_start_matches('<').trim_end_matches('>');
        match self.match_type {
            MatchType::ExactAddress => address.eq_ignore_ascii_case(&self.pattern),
            MatchType::Domain => match address.rsplit_once('@') {
                Some((_, domain)) => domain.eq_ignore_ascii_case(&self.pattern),
                None => false,
            },
            MatchType::WildcardDomain => {
                let wildcard = self.pattern.strip_prefix("*.").unwrap_or(&self.pattern);
                match address.rsplit_once('@') {
                    // Match the domain itself or any subdomain
                    Some((_, domain)) => {
                        domain.eq_ignore_ascii_case(wildcard)
                            || domain
                                .to_ascii_lowercase()
                                .ends_with(&format!(".{}", wildcard.to_ascii_lowercase()))
                    }
                    None => false,
                }
            }
        }
    }
}

/// Rule as written in the configuration file, with either an `address`
/// or a `domain` key.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressRuleConfig {
    /// Exact email address match (e.g. "admin@example.com").
    pub address: Option<String>,

    /// Domain match, supports wildcard prefix (e.g. "example.com" or "*.example.com").
    pub domain: Option<String>,
}

impl From<&AddressRuleConfig> for AddressRule {
    fn from(config: &AddressRuleConfig) -> Self {
        Self {
            match_type: determine_match_type(&config.address, &config.domain),
            pattern: extract_pattern(&config.address, &config.domain),
        }
    }
}

/// Set of rules where any single match accepts the address.
///
/// An empty filter accepts every address.
#[derive(Debug, Clone, Default)]
pub struct AddressFilter {
    rules: Vec<AddressRule>,
}

impl AddressFilter {
    pub fn new(rules: Vec<AddressRule>) -> Self {
        Self { rules }
    }

    /// Filter accepting every address.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, address: &str) -> bool {
        self.rules.is_empty() || self.rules.iter().any(|rule| rule.matches(address))
    }

    pub fn rules(&self) -> &[AddressRule] {
        &self.rules
    }
}

impl From<&[AddressRuleConfig]> for AddressFilter {
    fn from(configs: &[AddressRuleConfig]) -> Self {
        Self::new(configs.iter().map(AddressRule::from).collect())
    }
}

/// Determines the match type from a rule configuration.
///
/// Returns [`ExactAddress`](MatchType::ExactAddress) if an address field is present,
/// [`WildcardDomain`](MatchType::WildcardDomain) if the domain starts with `*.`,
/// or [`Domain`](MatchType::Domain) otherwise.
pub fn determine_match_type(address: &Option<String>, domain: &Option<String>) -> MatchType {
    if address.is_some() {
        MatchType::ExactAddress
    } else if let Some(d) = domain {
        if d.starts_with("*.") {
            MatchType::WildcardDomain
        } else {
            MatchType::Domain
        }
    } else {
        MatchType::Domain
    }
}

/// Extracts the pattern string from a rule configuration.
pub fn extract_pattern(address: &Option<String>, domain: &Option<String>) -> String {
    address
        .as_ref()
        .or(domain.as_ref())
        .cloned()
        .unwrap_or_default()
}
