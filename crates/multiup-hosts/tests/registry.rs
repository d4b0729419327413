use std::io::Write;

use multiup_hosts::{AuthKind, HostError, HostRegistry, ProtocolShape};

#[test]
fn user_file_overrides_builtin_by_id() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [hosts.imx]
        enabled = false

        [hosts.keep2share.endpoints]
        init = "http://127.0.0.1:9/init"
        "#
    )
    .unwrap();

    let registry = HostRegistry::load(Some(file.path())).unwrap();
    assert!(registry.rejected().is_empty(), "{:?}", registry.rejected());

    let imx = registry.get("imx").unwrap();
    assert!(!imx.enabled);
    // untouched keys survive the merge
    assert_eq!(imx.api_key_header.as_deref(), Some("X-API-KEY"));

    let k2s = registry.get("keep2share").unwrap();
    assert_eq!(k2s.endpoints.init.as_deref(), Some("http://127.0.0.1:9/init"));

    let enabled: Vec<_> = registry.list_enabled().iter().map(|h| h.id.clone()).collect();
    assert!(!enabled.contains(&"imx".to_string()));
    assert!(enabled.contains(&"keep2share".to_string()));
}

#[test]
fn user_file_can_add_a_host() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [hosts.mirror]
        auth_kind = "token_login"
        protocol = "multi_step"
        token_ttl = 600
        endpoints.login = "https://mirror.test/login"
        endpoints.init = "https://mirror.test/init"
        rules.token = {{ json = "/token" }}
        rules.upload_url = {{ json = "/url" }}
        rules.download_url = {{ json = "/link" }}
        "#
    )
    .unwrap();

    let registry = HostRegistry::load(Some(file.path())).unwrap();
    let mirror = registry.get("mirror").unwrap();
    assert_eq!(mirror.auth_kind, AuthKind::TokenLogin);
    assert_eq!(mirror.protocol, ProtocolShape::MultiStep);
    assert_eq!(mirror.token_ttl, 600);
    assert_eq!(registry.len(), 5);
}

#[test]
fn invalid_entries_are_rejected_individually() {
    let registry = HostRegistry::from_toml_str(
        r#"
        [hosts.good]
        auth_kind = "api_key"
        protocol = "single_step"
        api_key_header = "Authorization"
        endpoints.upload = "https://good.test/up"
        rules.download_url = { json = "/url" }

        [hosts.negative]
        auth_kind = "api_key"
        protocol = "single_step"
        api_key_header = "Authorization"
        max_file_size = -5
        endpoints.upload = "https://neg.test/up"
        rules.download_url = { json = "/url" }

        [hosts.unknown_kind]
        auth_kind = "carrier_pigeon"
        protocol = "single_step"

        [hosts.no_auth]
        protocol = "single_step"
        endpoints.upload = "https://x.test/up"
        rules.download_url = { json = "/url" }
        "#,
    )
    .unwrap();

    assert_eq!(registry.len(), 1);
    assert!(registry.get("good").is_ok());
    assert_eq!(registry.rejected().len(), 3);
    assert!(
        registry
            .rejected()
            .iter()
            .all(|e| matches!(e, HostError::Invalid { .. }))
    );
    assert!(matches!(registry.get("negative"), Err(HostError::NotFound(_))));
}

#[test]
fn missing_override_file_is_an_empty_layer() {
    let dir = tempfile::tempdir().unwrap();
    let registry = HostRegistry::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(registry.len(), 4);
}
