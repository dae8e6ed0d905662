//! Field masking rules and the deterministic masking function.
//!
//! A masking rule maps field names to an optional masking function. The
//! function, in priority order:
//!
//! 1. a custom one-way digest ([`DigestAlgorithm`]), hex-encoded, with an
//!    optional fixed prefix;
//! 2. ordered regex-replacement pairs applied in sequence to the UTF-8
//!    decoded value;
//! 3. the default: a keyed BLAKE2b digest (32-byte output) with an
//!    operator-configurable 16-byte salt and 16-byte personalization,
//!    hex-encoded, with an optional fixed prefix.
//!
//! The default path is deterministic -- identical input and key always
//! produce identical output, so exact-match queries over masked values
//! keep working -- and is not invertible.
//!
//! Across roles the merge is an intersection: a field stays masked only if
//! *every* contributing role masks it. A role with no masking entry for a
//! field has no masking opinion, and the permissive outcome (the real
//! value) wins.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use blake2::digest::consts::U32;
use blake2::digest::{FixedOutput, Update};
use blake2::Blake2bMac;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use tourmaline_types::glob_matches;

use crate::error::{Result, RuleError};
use crate::restriction::RestrictionRule;

/// Salt and personalization for the default keyed masking digest.
///
/// Operators configure both; deployments that must support exact-match
/// queries across nodes use the same key everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskKey {
    salt: [u8; 16],
    personalization: [u8; 16],
}

impl MaskKey {
    /// Creates a key from an operator-supplied salt and personalization.
    pub const fn new(salt: [u8; 16], personalization: [u8; 16]) -> Self {
        Self {
            salt,
            personalization,
        }
    }

    /// The 16-byte salt.
    pub fn salt(&self) -> &[u8; 16] {
        &self.salt
    }

    /// The 16-byte personalization string.
    pub fn personalization(&self) -> &[u8; 16] {
        &self.personalization
    }
}

impl Default for MaskKey {
    fn default() -> Self {
        Self::new(*b"tourmaline-salt!", *b"tourmaline-mask!")
    }
}

/// One-way digest algorithms for the custom-digest masking path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256, 64 hex characters.
    Sha256,
    /// SHA-512, 128 hex characters.
    Sha512,
    /// BLAKE3, 64 hex characters.
    Blake3,
}

impl DigestAlgorithm {
    fn digest_hex(self, value: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => bytes_to_hex(&sha2::Sha256::digest(value)),
            DigestAlgorithm::Sha512 => bytes_to_hex(&sha2::Sha512::digest(value)),
            DigestAlgorithm::Blake3 => blake3::hash(value).to_hex().to_string(),
        }
    }
}

/// One regex-replacement pair, applied with `replace_all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexReplacement {
    pattern: String,
    replacement: String,
    #[serde(skip)]
    compiled: OnceLock<Regex>,
}

impl RegexReplacement {
    /// Creates a replacement pair. The pattern is compiled on first use
    /// and checked by [`validate`](MaskSpec::validate) at role-compile
    /// time.
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            compiled: OnceLock::new(),
        }
    }

    fn regex(&self) -> Result<&Regex> {
        if let Some(re) = self.compiled.get() {
            return Ok(re);
        }
        let re = Regex::new(&self.pattern).map_err(|source| RuleError::InvalidRegex {
            pattern: self.pattern.clone(),
            source,
        })?;
        Ok(self.compiled.get_or_init(|| re))
    }

    fn apply(&self, text: &str) -> Result<String> {
        Ok(self
            .regex()?
            .replace_all(text, self.replacement.as_str())
            .into_owned())
    }
}

impl PartialEq for RegexReplacement {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.replacement == other.replacement
    }
}

/// The masking function attached to one pattern entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaskSpec {
    /// Custom one-way digest, hex-encoded, optional fixed prefix.
    Digest {
        /// The digest to apply to the raw bytes.
        algorithm: DigestAlgorithm,
        /// Prefix prepended to the hex digest, if any.
        prefix: Option<String>,
    },
    /// Ordered regex replacements applied in sequence to the decoded value.
    RegexReplace {
        /// The replacement pairs, applied first to last.
        replacements: Vec<RegexReplacement>,
    },
    /// The default keyed BLAKE2b digest.
    Keyed {
        /// Prefix prepended to the hex digest, if any.
        prefix: Option<String>,
    },
}

impl MaskSpec {
    /// The default masking function with no prefix.
    pub fn keyed() -> Self {
        MaskSpec::Keyed { prefix: None }
    }

    /// Masks raw bytes. The byte-level core shared by all input forms.
    pub fn mask_bytes(&self, value: &[u8], key: &MaskKey) -> Result<Vec<u8>> {
        match self {
            MaskSpec::Digest { algorithm, prefix } => {
                Ok(with_prefix(prefix, algorithm.digest_hex(value)).into_bytes())
            }
            MaskSpec::RegexReplace { replacements } => {
                let mut text = String::from_utf8_lossy(value).into_owned();
                for replacement in replacements {
                    text = replacement.apply(&text)?;
                }
                Ok(text.into_bytes())
            }
            MaskSpec::Keyed { prefix } => {
                Ok(with_prefix(prefix, keyed_digest_hex(value, key)?).into_bytes())
            }
        }
    }

    /// Masks a string value.
    pub fn mask_str(&self, value: &str, key: &MaskKey) -> Result<String> {
        let bytes = self.mask_bytes(value.as_bytes(), key)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Masks a length-prefixed binary term (big-endian `u16` length,
    /// then payload), rewriting the prefix for the masked payload.
    pub fn mask_term(&self, term: &[u8], key: &MaskKey) -> Result<Vec<u8>> {
        let (len_bytes, payload) = term
            .split_first_chunk::<2>()
            .ok_or_else(|| RuleError::MalformedTerm("missing length prefix".to_string()))?;
        let declared = usize::from(u16::from_be_bytes(*len_bytes));
        if payload.len() != declared {
            return Err(RuleError::MalformedTerm(format!(
                "declared {declared} bytes, found {}",
                payload.len()
            )));
        }

        let masked = self.mask_bytes(payload, key)?;
        let masked_len = u16::try_from(masked.len()).map_err(|_| {
            RuleError::MalformedTerm(format!("masked payload too long: {} bytes", masked.len()))
        })?;

        let mut out = Vec::with_capacity(2 + masked.len());
        out.extend_from_slice(&masked_len.to_be_bytes());
        out.extend_from_slice(&masked);
        Ok(out)
    }

    /// Checks that this spec can actually run (regexes compile).
    pub fn validate(&self) -> Result<()> {
        if let MaskSpec::RegexReplace { replacements } = self {
            for replacement in replacements {
                replacement.regex()?;
            }
        }
        Ok(())
    }
}

/// Keyed BLAKE2b-256 over `value`, hex-encoded.
///
/// The operator salt doubles as the MAC key, so the digest is useless
/// without the key even for low-entropy inputs.
fn keyed_digest_hex(value: &[u8], key: &MaskKey) -> Result<String> {
    let mut mac =
        Blake2bMac::<U32>::new_with_salt_and_personal(&key.salt, &key.salt, &key.personalization)
            .map_err(|e| RuleError::InvalidMaskKey(e.to_string()))?;
    mac.update(value);
    Ok(bytes_to_hex(&mac.finalize_fixed()))
}

fn with_prefix(prefix: &Option<String>, hex: String) -> String {
    match prefix {
        Some(p) => format!("{p}{hex}"),
        None => hex,
    }
}

/// Converts a byte slice to a lowercase hex string.
fn bytes_to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(hex, "{byte:02x}").expect("writing to String should not fail");
    }
    hex
}

/// One (field pattern, masking function) entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskEntry {
    pattern: String,
    spec: MaskSpec,
}

impl MaskEntry {
    /// Creates an entry masking fields that match `pattern`.
    pub fn new(pattern: impl Into<String>, spec: MaskSpec) -> Self {
        Self {
            pattern: pattern.into(),
            spec,
        }
    }
}

/// A field-masking rule, possibly merged across several roles.
///
/// Each branch is one role's ordered entry list; within a branch the
/// first matching pattern wins. A field is masked only if every branch
/// has a matching entry; the first branch's function is the one applied.
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldMaskingRule {
    branches: Vec<Vec<MaskEntry>>,
    key: MaskKey,
    #[serde(skip)]
    cache: RwLock<HashMap<String, Option<MaskSpec>>>,
}

impl FieldMaskingRule {
    /// Builds a rule from one role's entry list, with the default key.
    pub fn from_entries(entries: Vec<MaskEntry>) -> Self {
        Self {
            branches: vec![entries],
            key: MaskKey::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the operator masking key.
    pub fn with_key(mut self, key: MaskKey) -> Self {
        self.key = key;
        self
    }

    /// The masking function for the named field, if any.
    ///
    /// Memoized per field name for the lifetime of this rule value.
    pub fn mask_for(&self, field: &str) -> Option<MaskSpec> {
        if let Ok(cache) = self.cache.read() {
            if let Some(found) = cache.get(field) {
                return found.clone();
            }
        }
        let found = self.resolve(field);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(field.to_string(), found.clone());
        }
        found
    }

    /// Whether the named field passes through unmasked.
    pub fn is_not_masked(&self, field: &str) -> bool {
        self.mask_for(field).is_none()
    }

    /// Masks `value` if this rule masks `field`; returns the original
    /// bytes otherwise.
    pub fn apply(&self, field: &str, value: &[u8]) -> Result<Vec<u8>> {
        match self.mask_for(field) {
            Some(spec) => spec.mask_bytes(value, &self.key),
            None => Ok(value.to_vec()),
        }
    }

    /// The operator key this rule masks with.
    pub fn key(&self) -> &MaskKey {
        &self.key
    }

    /// Intersection across branches; first branch's function applies.
    fn resolve(&self, field: &str) -> Option<MaskSpec> {
        let mut chosen: Option<&MaskSpec> = None;
        if self.branches.is_empty() {
            return None;
        }
        for branch in &self.branches {
            let hit = branch
                .iter()
                .find(|entry| glob_matches(&entry.pattern, field))?;
            chosen.get_or_insert(&hit.spec);
        }
        chosen.cloned()
    }
}

impl Clone for FieldMaskingRule {
    fn clone(&self) -> Self {
        Self {
            branches: self.branches.clone(),
            key: self.key,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl PartialEq for FieldMaskingRule {
    fn eq(&self, other: &Self) -> bool {
        self.branches == other.branches && self.key == other.key
    }
}

impl RestrictionRule for FieldMaskingRule {
    fn unrestricted() -> Self {
        Self {
            branches: Vec::new(),
            key: MaskKey::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn fully_restricted() -> Self {
        Self::from_entries(vec![MaskEntry::new("*", MaskSpec::keyed())])
    }

    fn is_unrestricted(&self) -> bool {
        self.branches.is_empty()
    }

    fn merge<I: IntoIterator<Item = Self>>(rules: I) -> Self {
        let mut branches = Vec::new();
        let mut key = None;
        for rule in rules {
            // A contributor without masking entries has no masking opinion
            // anywhere, so nothing in the merge stays masked.
            if rule.is_unrestricted() {
                return Self::unrestricted();
            }
            key.get_or_insert(rule.key);
            branches.extend(rule.branches);
        }
        Self {
            branches,
            key: key.unwrap_or_default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn validate(&self) -> Result<()> {
        for branch in &self.branches {
            for entry in branch {
                entry.spec.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keyed_masking_is_deterministic() {
        let spec = MaskSpec::keyed();
        let key = MaskKey::default();

        let a = spec.mask_bytes(b"123-45-6789", &key).unwrap();
        let b = spec.mask_bytes(b"123-45-6789", &key).unwrap();
        assert_eq!(a, b);
        // 32-byte digest, hex-encoded.
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_keyed_masking_depends_on_key() {
        let spec = MaskSpec::keyed();
        let key_a = MaskKey::default();
        let key_b = MaskKey::new(*b"another-salt-16b", *b"tourmaline-mask!");

        let a = spec.mask_bytes(b"value", &key_a).unwrap();
        let b = spec.mask_bytes(b"value", &key_b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_keyed_masking_depends_on_personalization() {
        let spec = MaskSpec::keyed();
        let key_a = MaskKey::new(*b"tourmaline-salt!", *b"personal-aaaaaaa");
        let key_b = MaskKey::new(*b"tourmaline-salt!", *b"personal-bbbbbbb");

        assert_ne!(
            spec.mask_bytes(b"value", &key_a).unwrap(),
            spec.mask_bytes(b"value", &key_b).unwrap()
        );
    }

    #[test]
    fn test_keyed_masking_prefix() {
        let spec = MaskSpec::Keyed {
            prefix: Some("mask_".to_string()),
        };
        let masked = spec.mask_str("value", &MaskKey::default()).unwrap();
        assert!(masked.starts_with("mask_"));
        assert_eq!(masked.len(), 5 + 64);
    }

    #[test]
    fn test_digest_variants() {
        let key = MaskKey::default();
        let sha256 = MaskSpec::Digest {
            algorithm: DigestAlgorithm::Sha256,
            prefix: None,
        };
        let sha512 = MaskSpec::Digest {
            algorithm: DigestAlgorithm::Sha512,
            prefix: None,
        };
        let blake3 = MaskSpec::Digest {
            algorithm: DigestAlgorithm::Blake3,
            prefix: None,
        };

        assert_eq!(sha256.mask_str("v", &key).unwrap().len(), 64);
        assert_eq!(sha512.mask_str("v", &key).unwrap().len(), 128);
        assert_eq!(blake3.mask_str("v", &key).unwrap().len(), 64);

        // Digest path ignores the operator key entirely.
        let other = MaskKey::new(*b"another-salt-16b", *b"another-mask-16b");
        assert_eq!(
            sha256.mask_str("v", &key).unwrap(),
            sha256.mask_str("v", &other).unwrap()
        );
    }

    #[test]
    fn test_regex_replacements_apply_in_sequence() {
        let spec = MaskSpec::RegexReplace {
            replacements: vec![
                RegexReplacement::new(r"\d", "*"),
                RegexReplacement::new(r"\*{4}$", "####"),
            ],
        };
        let masked = spec.mask_str("555-123-4567", &MaskKey::default()).unwrap();
        assert_eq!(masked, "***-***-####");
    }

    #[test]
    fn test_invalid_regex_fails_validation_and_masking() {
        let spec = MaskSpec::RegexReplace {
            replacements: vec![RegexReplacement::new("(unclosed", "x")],
        };
        assert!(spec.validate().is_err());
        assert!(spec.mask_str("value", &MaskKey::default()).is_err());
    }

    #[test]
    fn test_mask_term_rewrites_prefix() {
        let spec = MaskSpec::keyed();
        let key = MaskKey::default();

        let mut term = vec![0x00, 0x05];
        term.extend_from_slice(b"hello");

        let masked = spec.mask_term(&term, &key).unwrap();
        let declared = u16::from_be_bytes([masked[0], masked[1]]) as usize;
        assert_eq!(declared, 64);
        assert_eq!(masked.len(), 2 + 64);
        // Payload equals the byte-level masking of the original payload.
        assert_eq!(masked[2..], spec.mask_bytes(b"hello", &key).unwrap());
    }

    #[test]
    fn test_mask_term_rejects_bad_prefix() {
        let spec = MaskSpec::keyed();
        let key = MaskKey::default();

        assert!(spec.mask_term(&[0x01], &key).is_err());
        assert!(spec.mask_term(&[0x00, 0x09, b'x'], &key).is_err());
    }

    #[test]
    fn test_rule_first_pattern_wins_within_branch() {
        let rule = FieldMaskingRule::from_entries(vec![
            MaskEntry::new(
                "ssn",
                MaskSpec::Digest {
                    algorithm: DigestAlgorithm::Sha256,
                    prefix: None,
                },
            ),
            MaskEntry::new("s*", MaskSpec::keyed()),
        ]);

        assert_eq!(
            rule.mask_for("ssn"),
            Some(MaskSpec::Digest {
                algorithm: DigestAlgorithm::Sha256,
                prefix: None,
            })
        );
        assert_eq!(rule.mask_for("status"), Some(MaskSpec::keyed()));
        assert!(rule.is_not_masked("name"));
    }

    #[test]
    fn test_merge_is_intersection() {
        let a = FieldMaskingRule::from_entries(vec![
            MaskEntry::new("ssn", MaskSpec::keyed()),
            MaskEntry::new("phone", MaskSpec::keyed()),
        ]);
        let b = FieldMaskingRule::from_entries(vec![MaskEntry::new("ssn", MaskSpec::keyed())]);

        let merged = FieldMaskingRule::merge([a, b]);
        // Both roles mask ssn; only one masks phone.
        assert!(!merged.is_not_masked("ssn"));
        assert!(merged.is_not_masked("phone"));
    }

    #[test]
    fn test_merge_silent_role_unmasks() {
        // A role that is merely silent about a field (not explicitly
        // unmasking it) still lifts the mask for the combined identity.
        let masking = FieldMaskingRule::from_entries(vec![MaskEntry::new("y", MaskSpec::keyed())]);
        let silent = FieldMaskingRule::unrestricted();

        let merged = FieldMaskingRule::merge([masking, silent]);
        assert!(merged.is_not_masked("y"));
        assert!(merged.is_unrestricted());
    }

    #[test]
    fn test_merge_first_branch_spec_wins() {
        let a = FieldMaskingRule::from_entries(vec![MaskEntry::new(
            "ssn",
            MaskSpec::Digest {
                algorithm: DigestAlgorithm::Sha512,
                prefix: None,
            },
        )]);
        let b = FieldMaskingRule::from_entries(vec![MaskEntry::new("ssn", MaskSpec::keyed())]);

        let merged = FieldMaskingRule::merge([a, b]);
        assert_eq!(
            merged.mask_for("ssn"),
            Some(MaskSpec::Digest {
                algorithm: DigestAlgorithm::Sha512,
                prefix: None,
            })
        );
    }

    #[test]
    fn test_apply_passes_unmasked_fields_through() {
        let rule = FieldMaskingRule::from_entries(vec![MaskEntry::new("ssn", MaskSpec::keyed())]);

        assert_eq!(rule.apply("name", b"alice").unwrap(), b"alice");
        assert_ne!(rule.apply("ssn", b"123-45-6789").unwrap(), b"123-45-6789");
    }

    #[test]
    fn test_fully_restricted_masks_everything() {
        let rule = FieldMaskingRule::fully_restricted();
        assert!(!rule.is_not_masked("anything"));
    }

    #[test]
    fn test_serde_round_trip() {
        let rule = FieldMaskingRule::from_entries(vec![
            MaskEntry::new("ssn", MaskSpec::keyed()),
            MaskEntry::new(
                "phone",
                MaskSpec::RegexReplace {
                    replacements: vec![RegexReplacement::new(r"\d", "*")],
                },
            ),
        ]);
        let json = serde_json::to_string(&rule).unwrap();
        let back: FieldMaskingRule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, back);
    }

    proptest! {
        #[test]
        fn prop_keyed_masking_deterministic(value in proptest::collection::vec(any::<u8>(), 0..256)) {
            let spec = MaskSpec::keyed();
            let key = MaskKey::default();
            prop_assert_eq!(
                spec.mask_bytes(&value, &key).unwrap(),
                spec.mask_bytes(&value, &key).unwrap()
            );
        }

        #[test]
        fn prop_keyed_masking_avalanche(
            value in proptest::collection::vec(any::<u8>(), 1..128),
            flip in 0usize..128,
        ) {
            let spec = MaskSpec::keyed();
            let key = MaskKey::default();
            let mut altered = value.clone();
            let idx = flip % altered.len();
            altered[idx] ^= 0x01;

            let original = spec.mask_bytes(&value, &key).unwrap();
            let changed = spec.mask_bytes(&altered, &key).unwrap();
            prop_assert_ne!(original, changed);
        }

        #[test]
        fn prop_masked_value_never_echoes_input(value in "[a-z]{8,32}") {
            let spec = MaskSpec::keyed();
            let masked = spec.mask_str(&value, &MaskKey::default()).unwrap();
            prop_assert!(!masked.contains(&value));
        }
    }
}
