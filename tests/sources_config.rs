// tests/sources_config.rs
use std::fs;
use std::io::Write;

use feed_digest::config::{load_sources, load_sources_from, DigestConfig};
use tempfile::NamedTempFile;

#[test]
fn loads_toml_file_and_dedups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feeds.toml");
    fs::write(
        &path,
        r#"
[[sources]]
name = "simonwillison.net"
locator = "https://simonwillison.net/atom/everything/"
display_locator = "https://simonwillison.net"

[[sources]]
name = "again"
locator = "https://simonwillison.net/atom/everything/"
"#,
    )
    .unwrap();

    let v = load_sources_from(&path).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].name, "simonwillison.net");
    assert_eq!(v[0].display_locator, "https://simonwillison.net");
}

#[test]
fn json_without_extension_is_detected() {
    let mut f = NamedTempFile::new().unwrap();
    write!(
        f,
        r#"[{{"name":"antirez.com","xmlUrl":"http://antirez.com/rss","htmlUrl":"http://antirez.com"}}]"#
    )
    .unwrap();

    let v = load_sources_from(f.path()).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].locator, "http://antirez.com/rss");
}

#[test]
fn explicit_path_plus_x_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feeds.json");
    fs::write(&path, r#"[{"name":"a","url":"https://a.test/rss"}]"#).unwrap();

    let cfg = DigestConfig {
        sources_path: Some(path),
        x_accounts: vec!["karpathy".into()],
        rsshub_base_url: "http://localhost:1200".into(),
        ..DigestConfig::default()
    };
    let v = load_sources(&cfg).unwrap();
    assert_eq!(v.len(), 2);
    assert_eq!(v[0].display_locator, "https://a.test/rss");
    assert_eq!(v[1].locator, "http://localhost:1200/twitter/user/karpathy");
}

#[test]
fn missing_explicit_path_is_an_error() {
    let cfg = DigestConfig {
        sources_path: Some("/definitely/not/here.toml".into()),
        ..DigestConfig::default()
    };
    let err = load_sources(&cfg).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn garbage_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feeds.toml");
    fs::write(&path, "this is not a feed list").unwrap();
    assert!(load_sources_from(&path).is_err());
}
