use gitvend_core::Repository;
use gitvend_upstream::client::{Tag, Upstream};
use gitvend_upstream::error::UpstreamError;
use gitvend_upstream::resolve::{
    ResolveError, is_prerelease, latest_stable_tag, resolve_latest_stable,
};
use mockall::mock;
use proptest::prelude::*;
use std::path::Path;
use tokio_util::sync::CancellationToken;

mock! {
    Host {}

    impl Upstream for Host {
        async fn list_tags(
            &self,
            repository: &Repository,
            cancel: &CancellationToken,
        ) -> Result<Vec<Tag>, UpstreamError>;
        async fn download(
            &self,
            url: &str,
            dest: &Path,
            cancel: &CancellationToken,
        ) -> Result<u64, UpstreamError>;
    }
}

fn tags(names: &[&str]) -> Vec<Tag> {
    names.iter().map(|n| Tag::new(n)).collect()
}

fn git_repo() -> Repository {
    "git/git".parse().unwrap()
}

// ── Pre-release detection ──

#[test]
fn prerelease_markers_are_case_insensitive() {
    assert!(is_prerelease("v2.46.0-rc0"));
    assert!(is_prerelease("v2.46.0-RC1"));
    assert!(is_prerelease("v3.0.0-Beta"));
    assert!(is_prerelease("v3.0.0-alpha.2"));
    assert!(!is_prerelease("v2.45.0"));
    assert!(!is_prerelease("v2.45.2"));
}

#[test]
fn latest_stable_skips_leading_prereleases() {
    let list = tags(&["v2.46.0-rc2", "v2.46.0-rc1", "v2.45.2", "v2.45.1"]);
    assert_eq!(latest_stable_tag(&list).map(|t| t.name.as_str()), Some("v2.45.2"));
}

#[test]
fn latest_stable_keeps_upstream_order() {
    // Upstream order wins even when it is not semver-sorted.
    let list = tags(&["v2.44.0", "v2.45.0"]);
    assert_eq!(latest_stable_tag(&list).map(|t| t.name.as_str()), Some("v2.44.0"));
}

#[test]
fn latest_stable_none_for_empty_or_all_prerelease() {
    assert!(latest_stable_tag(&[]).is_none());
    assert!(latest_stable_tag(&tags(&["v1-rc1", "v1-beta", "v1-ALPHA"])).is_none());
}

// ── resolve_latest_stable ──

#[tokio::test]
async fn resolve_returns_version_tag() {
    let mut mock = MockHost::new();
    mock.expect_list_tags()
        .withf(|repo, _| repo.owner == "git" && repo.name == "git")
        .times(1)
        .returning(|_, _| Ok(tags(&["v2.46.0-rc0", "v2.45.0"])));

    let tag = resolve_latest_stable(&mock, &git_repo(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(tag.as_str(), "v2.45.0");
    assert_eq!(tag.version(), "2.45.0");
}

#[tokio::test]
async fn resolve_all_prerelease_is_no_stable_version() {
    let mut mock = MockHost::new();
    mock.expect_list_tags()
        .returning(|_, _| Ok(tags(&["v2.46.0-rc1", "v2.46.0-rc0"])));

    let err = resolve_latest_stable(&mock, &git_repo(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ResolveError::NoStableVersionFound {
            repository,
            candidates,
        } => {
            assert_eq!(repository, "git/git");
            assert_eq!(candidates, 2);
        }
        other => panic!("expected NoStableVersionFound, got {other:?}"),
    }
}

#[tokio::test]
async fn resolve_empty_list_is_no_stable_version() {
    let mut mock = MockHost::new();
    mock.expect_list_tags().returning(|_, _| Ok(Vec::new()));

    let err = resolve_latest_stable(&mock, &git_repo(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::NoStableVersionFound { .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn resolve_server_error_is_transient_fetch_failure() {
    let mut mock = MockHost::new();
    mock.expect_list_tags().returning(|_, _| {
        Err(UpstreamError::Status {
            url: "https://api.github.com/repos/git/git/tags".to_owned(),
            status: 500,
        })
    });

    let err = resolve_latest_stable(&mock, &git_repo(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Fetch {
            source: UpstreamError::Status { status: 500, .. }
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn resolve_rejects_path_like_tag_names() {
    let mut mock = MockHost::new();
    mock.expect_list_tags()
        .returning(|_, _| Ok(tags(&["release/2.45"])));

    let err = resolve_latest_stable(&mock, &git_repo(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::InvalidTag { .. }));
}

fn tag_name() -> impl Strategy<Value = String> {
    let stable = "v[0-9]\\.[0-9]{1,2}\\.[0-9]";
    let pre = "v[0-9]\\.[0-9]{1,2}\\.[0-9]-(rc|RC|beta|Beta|alpha)[0-9]";
    prop_oneof![stable, pre]
}

proptest! {
    #[test]
    fn latest_stable_is_first_non_prerelease(names in prop::collection::vec(tag_name(), 0..20)) {
        let list: Vec<Tag> = names.iter().map(|n| Tag::new(n)).collect();
        let expected = names.iter().find(|n| !is_prerelease(n));
        prop_assert_eq!(latest_stable_tag(&list).map(|t| &t.name), expected);
    }

    #[test]
    fn result_is_never_a_prerelease(names in prop::collection::vec(tag_name(), 1..20)) {
        let list: Vec<Tag> = names.iter().map(|n| Tag::new(n)).collect();
        if let Some(tag) = latest_stable_tag(&list) {
            let lower = tag.name.to_ascii_lowercase();
            prop_assert!(!lower.contains("-rc"));
            prop_assert!(!lower.contains("-beta"));
            prop_assert!(!lower.contains("-alpha"));
        }
    }
}
