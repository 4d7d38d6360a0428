use msgcode_ingress::OwnerWhitelist;

use crate::identity::normalize_identity;
use crate::types::OwnerConfig;

/// `OwnerWhitelist` backed by the single configured owner identity. Group
/// restriction (`owner_only_in_group`) is enforced by the caller that knows
/// whether a chat is a group, since the whitelist itself only sees the
/// sender identity.
pub struct StaticOwnerWhitelist {
    config: OwnerConfig,
}

impl StaticOwnerWhitelist {
    pub fn new(config: OwnerConfig) -> Self {
        Self { config }
    }

    pub fn owner_only_in_group(&self) -> bool {
        self.config.owner_only_in_group
    }
}

impl OwnerWhitelist for StaticOwnerWhitelist {
    fn is_whitelisted(&self, identity: &str) -> bool {
        normalize_identity(identity) == self.config.owner_identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_normalized_match_is_whitelisted() {
        let whitelist = StaticOwnerWhitelist::new(OwnerConfig::new("Owner@Example.com", false));
        assert!(whitelist.is_whitelisted("owner@example.com"));
        assert!(whitelist.is_whitelisted("Owner@Example.COM"));
    }

    #[test]
    fn non_owner_identity_is_rejected() {
        let whitelist = StaticOwnerWhitelist::new(OwnerConfig::new("owner@example.com", false));
        assert!(!whitelist.is_whitelisted("someone-else@example.com"));
    }

    #[test]
    fn phone_owner_matches_across_punctuation_variants() {
        let whitelist = StaticOwnerWhitelist::new(OwnerConfig::new("+15550123456", true));
        assert!(whitelist.is_whitelisted("+1 (555) 012-3456"));
        assert!(whitelist.owner_only_in_group());
    }
}
