//! Tag-derived identities.
//!
//! An [`ImageTag`] selects one built image. Two values are derived from it:
//!
//! - [`RevisionIdentity`]: a short, name-safe token embedded in the logical id
//!   of the task definition, so a new tag yields a new task revision.
//! - [`TriggerKey`]: the idempotency key of the forced-redeploy action, so a
//!   new tag forces exactly one rollout and a repeated tag forces none.
//!
//! Both derivations are pure and total over accepted tags. Validation
//! happens once, when the tag is constructed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Tag used when the operator supplies none.
pub const DEFAULT_TAG: &str = "latest";

/// Namespace prepended to the full tag to form a [`TriggerKey`].
pub const TRIGGER_KEY_PREFIX: &str = "force-update-";

/// Longest tag accepted, matching the OCI distribution limit.
pub const MAX_TAG_LEN: usize = 128;

/// A container image tag.
///
/// Equality is exact string equality. Any string up to [`MAX_TAG_LEN`]
/// characters is accepted as long as it contains at least one ASCII
/// alphanumeric character, which guarantees a non-empty
/// [`RevisionIdentity`].
///
/// # Examples
///
/// ```
/// use ecsroll_core::ImageTag;
///
/// let tag = ImageTag::new("v1.2.3").unwrap();
/// assert_eq!(tag.as_str(), "v1.2.3");
/// assert!(ImageTag::new("...").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageTag(String);

impl ImageTag {
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();

        if tag.is_empty() {
            return Err(Error::InvalidTag {
                tag,
                reason: "tag is empty",
            });
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(Error::InvalidTag {
                tag,
                reason: "tag is longer than 128 characters",
            });
        }
        if !tag.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidTag {
                tag,
                reason: "tag has no ASCII alphanumeric characters",
            });
        }

        Ok(Self(tag))
    }

    /// The sentinel tag [`DEFAULT_TAG`].
    pub fn latest() -> Self {
        Self(DEFAULT_TAG.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the tag of a deployment request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    /// Supplied by the operator, including an explicit `latest`.
    Explicit,
    /// Omitted; [`DEFAULT_TAG`] was substituted.
    Default,
}

/// A validated tag together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSelection {
    pub tag: ImageTag,
    pub source: TagSource,
}

impl TagSelection {
    /// Resolve the operator input. `None` and `""` select the default tag.
    ///
    /// ```
    /// use ecsroll_core::{TagSelection, TagSource};
    ///
    /// let sel = TagSelection::resolve(None).unwrap();
    /// assert_eq!(sel.tag.as_str(), "latest");
    /// assert_eq!(sel.source, TagSource::Default);
    /// ```
    pub fn resolve(input: Option<&str>) -> Result<Self> {
        match input {
            None | Some("") => Ok(Self {
                tag: ImageTag::latest(),
                source: TagSource::Default,
            }),
            Some(raw) => Ok(Self {
                tag: ImageTag::new(raw)?,
                source: TagSource::Explicit,
            }),
        }
    }

    pub fn is_default(&self) -> bool {
        self.source == TagSource::Default
    }
}

/// Maximum number of characters kept in a [`RevisionIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct RevisionLength(usize);

impl RevisionLength {
    pub const DEFAULT: Self = Self(8);
    pub const MAX: usize = 32;

    pub fn new(len: usize) -> Result<Self> {
        if len == 0 || len > Self::MAX {
            return Err(Error::InvalidConfig {
                field: "trigger.revision_length",
                reason: format!("must be between 1 and {}, got {len}", Self::MAX),
            });
        }
        Ok(Self(len))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for RevisionLength {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for RevisionLength {
    type Error = Error;

    fn try_from(len: usize) -> Result<Self> {
        Self::new(len)
    }
}

impl From<RevisionLength> for usize {
    fn from(len: RevisionLength) -> Self {
        len.0
    }
}

/// Name-safe token derived from an [`ImageTag`]. Only ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RevisionIdentity(String);

impl RevisionIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Idempotency key of the forced-redeploy action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TriggerKey(String);

impl TriggerKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip every character outside `[A-Za-z0-9]`, then keep the first `len`.
///
/// ```
/// use ecsroll_core::{ImageTag, RevisionLength, derive_revision_identity};
///
/// let tag = ImageTag::new("abcdef1234567890").unwrap();
/// let rev = derive_revision_identity(&tag, RevisionLength::DEFAULT);
/// assert_eq!(rev.as_str(), "abcdef12");
/// ```
pub fn derive_revision_identity(tag: &ImageTag, len: RevisionLength) -> RevisionIdentity {
    let token = tag
        .as_str()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(len.get())
        .collect();
    RevisionIdentity(token)
}

/// `force-update-` followed by the full tag.
pub fn derive_trigger_key(tag: &ImageTag) -> TriggerKey {
    TriggerKey(format!("{TRIGGER_KEY_PREFIX}{tag}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tag(s: &str) -> ImageTag {
        ImageTag::new(s).unwrap()
    }

    #[test]
    fn short_tag_is_used_in_full() {
        let rev = derive_revision_identity(&tag("v1"), RevisionLength::DEFAULT);
        assert_eq!(rev.as_str(), "v1");
    }

    #[test]
    fn disallowed_characters_are_stripped_before_truncation() {
        let rev = derive_revision_identity(&tag("release/2024.06_rc-1"), RevisionLength::DEFAULT);
        assert_eq!(rev.as_str(), "release2");
    }

    #[test]
    fn non_ascii_letters_are_stripped() {
        let rev = derive_revision_identity(&tag("ß-build-7"), RevisionLength::DEFAULT);
        assert_eq!(rev.as_str(), "build7");
    }

    #[test]
    fn custom_length_is_honored() {
        let len = RevisionLength::new(4).unwrap();
        let rev = derive_revision_identity(&tag("abcdef1234567890"), len);
        assert_eq!(rev.as_str(), "abcd");
    }

    #[test]
    fn revision_length_bounds() {
        assert!(RevisionLength::new(0).is_err());
        assert!(RevisionLength::new(33).is_err());
        assert_eq!(RevisionLength::new(32).unwrap().get(), 32);
    }

    #[test]
    fn rejects_tag_without_name_safe_characters() {
        let err = ImageTag::new("_.-").unwrap_err();
        assert!(matches!(err, Error::InvalidTag { ref tag, .. } if tag == "_.-"));
    }

    #[test]
    fn rejects_overlong_tag() {
        assert!(ImageTag::new("a".repeat(MAX_TAG_LEN)).is_ok());
        assert!(ImageTag::new("a".repeat(MAX_TAG_LEN + 1)).is_err());
    }

    #[test]
    fn empty_input_selects_default() {
        let sel = TagSelection::resolve(Some("")).unwrap();
        assert!(sel.is_default());
        assert_eq!(sel.tag, ImageTag::latest());
    }

    #[test]
    fn explicit_latest_is_not_default_source() {
        let sel = TagSelection::resolve(Some("latest")).unwrap();
        assert_eq!(sel.source, TagSource::Explicit);
        assert_eq!(sel.tag, ImageTag::latest());
    }

    mod prop {
        use super::*;

        proptest! {
            #[test]
            fn revision_identity_is_name_safe(
                raw in "\\PC{1,128}",
                len in 1usize..=RevisionLength::MAX,
            ) {
                prop_assume!(raw.chars().any(|c| c.is_ascii_alphanumeric()));
                let tag = ImageTag::new(raw).unwrap();
                let rev = derive_revision_identity(&tag, RevisionLength::new(len).unwrap());
                prop_assert!(!rev.as_str().is_empty());
                prop_assert!(rev.as_str().len() <= len);
                prop_assert!(rev.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
            }

            #[test]
            fn derivation_is_deterministic(raw in "[a-zA-Z0-9._-]{1,64}") {
                prop_assume!(raw.chars().any(|c| c.is_ascii_alphanumeric()));
                let a = ImageTag::new(raw.clone()).unwrap();
                let b = ImageTag::new(raw).unwrap();
                prop_assert_eq!(
                    derive_revision_identity(&a, RevisionLength::DEFAULT),
                    derive_revision_identity(&b, RevisionLength::DEFAULT)
                );
                prop_assert_eq!(derive_trigger_key(&a), derive_trigger_key(&b));
            }

            #[test]
            fn distinct_tags_give_distinct_keys(
                a in "[a-zA-Z0-9]{1,40}",
                b in "[a-zA-Z0-9]{1,40}",
            ) {
                prop_assume!(a != b);
                let ka = derive_trigger_key(&ImageTag::new(a).unwrap());
                let kb = derive_trigger_key(&ImageTag::new(b).unwrap());
                prop_assert_ne!(ka, kb);
            }

            #[test]
            fn distinct_prefix_window_gives_distinct_revisions(
                a in "[a-zA-Z0-9]{8,20}",
                b in "[a-zA-Z0-9]{8,20}",
            ) {
                prop_assume!(a[..8] != b[..8]);
                let ra = derive_revision_identity(&ImageTag::new(a).unwrap(), RevisionLength::DEFAULT);
                let rb = derive_revision_identity(&ImageTag::new(b).unwrap(), RevisionLength::DEFAULT);
                prop_assert_ne!(ra, rb);
            }
        }
    }
}
