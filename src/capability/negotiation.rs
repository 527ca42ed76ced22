//! Capability registry and per-session negotiation.

use super::{CapabilityError, ProtocolVersion};
use std::collections::BTreeMap;
use tracing::debug;

/// Key carrying the caller's protocol version.
pub const PROTOCOL_VERSION: &str = "protocol.version";

/// Key declaring whether the caller accepts free-text prompts.
pub const PROMPT_STRING: &str = "prompt.string";

/// Flat key to value map exchanged during the handshake.
pub type CapabilitySet = BTreeMap<String, String>;

/// How the value of a registered capability key is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityValueKind {
    /// A dotted [`ProtocolVersion`].
    Version,
    /// A boolean encoded as `"true"` or `"false"`.
    Boolean,
}

/// Process-wide table of negotiable capability keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRegistry {
    keys: BTreeMap<&'static str, CapabilityValueKind>,
}

impl CapabilityRegistry {
    /// Creates the registry with the canonical keys.
    #[must_use]
    pub fn standard() -> Self {
        let keys = BTreeMap::from([
            (PROTOCOL_VERSION, CapabilityValueKind::Version),
            (PROMPT_STRING, CapabilityValueKind::Boolean),
        ]);
        Self { keys }
    }

    /// Returns the value kind registered for `key`.
    #[must_use]
    pub fn kind_of(&self, key: &str) -> Option<CapabilityValueKind> {
        self.keys.get(key).copied()
    }

    /// Returns the capabilities this service advertises to callers.
    #[must_use]
    pub fn advertised(&self) -> CapabilitySet {
        BTreeMap::from([(
            PROTOCOL_VERSION.to_owned(),
            ProtocolVersion::CURRENT.to_string(),
        )])
    }

    /// Interprets the map offered by a caller.
    ///
    /// An absent protocol version is treated as the oldest known release. A
    /// missing or unparsable boolean counts as `false`. Unregistered keys are
    /// retained but have no effect.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidVersion`] when the caller supplies a
    /// malformed protocol version.
    pub fn negotiate(
        &self,
        offered: CapabilitySet,
    ) -> Result<NegotiatedCapabilities, CapabilityError> {
        let mut client_version = oldest_release();
        let mut prompt_string = false;

        for (key, value) in &offered {
            match (key.as_str(), self.kind_of(key)) {
                (PROTOCOL_VERSION, Some(CapabilityValueKind::Version)) => {
                    client_version = ProtocolVersion::parse(value)?;
                }
                (PROMPT_STRING, Some(CapabilityValueKind::Boolean)) => {
                    prompt_string = parse_flag(value);
                }
                _ => debug!(key = %key, "ignoring unregistered capability"),
            }
        }

        let effective_version = client_version.clone().min(ProtocolVersion::CURRENT);
        Ok(NegotiatedCapabilities {
            offered,
            client_version,
            effective_version,
            prompt_string,
        })
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn oldest_release() -> ProtocolVersion {
    ProtocolVersion::KNOWN_RELEASES
        .first()
        .cloned()
        .unwrap_or(ProtocolVersion::CURRENT)
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Capability set agreed for one session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedCapabilities {
    offered: CapabilitySet,
    client_version: ProtocolVersion,
    effective_version: ProtocolVersion,
    prompt_string: bool,
}

impl NegotiatedCapabilities {
    /// Returns the raw map the caller offered.
    #[must_use]
    pub const fn offered(&self) -> &CapabilitySet {
        &self.offered
    }

    /// Returns the version the caller declared.
    #[must_use]
    pub const fn client_version(&self) -> &ProtocolVersion {
        &self.client_version
    }

    /// Returns the version both sides speak: the lower of the caller's and
    /// [`ProtocolVersion::CURRENT`].
    #[must_use]
    pub const fn effective_version(&self) -> &ProtocolVersion {
        &self.effective_version
    }

    /// Returns whether the caller may receive `promptString` requests.
    #[must_use]
    pub const fn supports_prompt_string(&self) -> bool {
        self.prompt_string
    }

    /// Returns whether the session speaks at least `version`.
    #[must_use]
    pub fn speaks(&self, version: &ProtocolVersion) -> bool {
        self.effective_version >= *version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::standard()
    }

    fn offer(pairs: &[(&str, &str)]) -> CapabilitySet {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[rstest]
    fn current_client_negotiates_current_version(registry: CapabilityRegistry) {
        let negotiated = registry
            .negotiate(offer(&[(PROTOCOL_VERSION, "0.10.0"), (PROMPT_STRING, "true")]))
            .expect("negotiation should succeed");

        assert_eq!(negotiated.effective_version(), &ProtocolVersion::CURRENT);
        assert!(negotiated.supports_prompt_string());
        assert!(negotiated.speaks(&ProtocolVersion::V0_10_0));
    }

    #[rstest]
    fn older_client_is_served_at_its_own_version(registry: CapabilityRegistry) {
        let negotiated = registry
            .negotiate(offer(&[(PROTOCOL_VERSION, "0.9.0")]))
            .expect("negotiation should succeed");

        assert_eq!(negotiated.effective_version(), &ProtocolVersion::V0_9_0);
        assert!(!negotiated.speaks(&ProtocolVersion::V0_10_0));
    }

    #[rstest]
    fn newer_client_is_capped_at_current(registry: CapabilityRegistry) {
        let negotiated = registry
            .negotiate(offer(&[(PROTOCOL_VERSION, "1.2.0")]))
            .expect("negotiation should succeed");

        assert_eq!(negotiated.client_version(), &ProtocolVersion::new(1, 2, 0));
        assert_eq!(negotiated.effective_version(), &ProtocolVersion::CURRENT);
    }

    #[rstest]
    fn empty_offer_defaults_to_oldest_release_without_prompts(registry: CapabilityRegistry) {
        let negotiated = registry
            .negotiate(CapabilitySet::new())
            .expect("negotiation should succeed");

        assert_eq!(negotiated.effective_version(), &ProtocolVersion::V0_9_0);
        assert!(!negotiated.supports_prompt_string());
    }

    #[rstest]
    #[case("TRUE", true)]
    #[case("false", false)]
    #[case("yes", false)]
    #[case("", false)]
    fn prompt_flag_must_be_literal_true(
        registry: CapabilityRegistry,
        #[case] value: &str,
        #[case] expected: bool,
    ) {
        let negotiated = registry
            .negotiate(offer(&[(PROMPT_STRING, value)]))
            .expect("negotiation should succeed");
        assert_eq!(negotiated.supports_prompt_string(), expected);
    }

    #[rstest]
    fn malformed_version_is_rejected(registry: CapabilityRegistry) {
        let result = registry.negotiate(offer(&[(PROTOCOL_VERSION, "ten")]));
        assert_eq!(
            result,
            Err(CapabilityError::InvalidVersion("ten".to_owned()))
        );
    }

    #[rstest]
    fn unknown_keys_are_kept_but_ignored(registry: CapabilityRegistry) {
        let negotiated = registry
            .negotiate(offer(&[("editor.theme", "dark")]))
            .expect("negotiation should succeed");
        assert_eq!(
            negotiated.offered().get("editor.theme").map(String::as_str),
            Some("dark")
        );
    }

    #[rstest]
    fn advertises_current_version(registry: CapabilityRegistry) {
        let advertised = registry.advertised();
        assert_eq!(
            advertised.get(PROTOCOL_VERSION).map(String::as_str),
            Some("0.10.0")
        );
    }
}
