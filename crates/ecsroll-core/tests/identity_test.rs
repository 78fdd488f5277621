use ecsroll_core::{
    DeploymentSpec, ImageTag, RevisionLength, ServiceConfig, TagSelection, TagSource,
    derive_revision_identity, derive_trigger_key,
};

#[test]
fn commit_sha_tag_scenario() {
    let tag = ImageTag::new("abcdef1234567890").unwrap();

    let rev = derive_revision_identity(&tag, RevisionLength::DEFAULT);
    let key = derive_trigger_key(&tag);

    assert_eq!(rev.as_str(), "abcdef12");
    assert_eq!(key.as_str(), "force-update-abcdef1234567890");
}

#[test]
fn omitted_tag_matches_explicit_latest() {
    let omitted = TagSelection::resolve(None).unwrap();
    let explicit = TagSelection::resolve(Some("latest")).unwrap();

    assert_eq!(omitted.source, TagSource::Default);
    assert_eq!(explicit.source, TagSource::Explicit);
    assert_eq!(
        derive_revision_identity(&omitted.tag, RevisionLength::DEFAULT),
        derive_revision_identity(&explicit.tag, RevisionLength::DEFAULT)
    );
    assert_eq!(
        derive_trigger_key(&omitted.tag),
        derive_trigger_key(&explicit.tag)
    );
    assert_eq!(derive_trigger_key(&explicit.tag).as_str(), "force-update-latest");
}

#[test]
fn omitted_tag_resolves_to_repository_latest() {
    let fixed = ServiceConfig::default().fixed();
    let sel = TagSelection::resolve(None).unwrap();

    let spec = DeploymentSpec::build(&sel.tag, &fixed);

    assert_eq!(spec.image.to_string(), "ecsroll-app:latest");
}

#[test]
fn sequential_tags_have_distinct_keys() {
    let v1 = derive_trigger_key(&ImageTag::new("v1").unwrap());
    let v2 = derive_trigger_key(&ImageTag::new("v2").unwrap());

    assert_eq!(v1.as_str(), "force-update-v1");
    assert_eq!(v2.as_str(), "force-update-v2");
    assert_ne!(v1, v2);
}

#[test]
fn tags_equal_after_stripping_share_a_revision_but_not_a_key() {
    let a = ImageTag::new("v1.2.3").unwrap();
    let b = ImageTag::new("v1-2-3").unwrap();

    assert_eq!(
        derive_revision_identity(&a, RevisionLength::DEFAULT),
        derive_revision_identity(&b, RevisionLength::DEFAULT)
    );
    assert_ne!(derive_trigger_key(&a), derive_trigger_key(&b));
}

#[test]
fn invalid_tag_is_rejected_at_resolution() {
    assert!(TagSelection::resolve(Some("---")).is_err());
    assert!(TagSelection::resolve(Some(" ")).is_err());
}
