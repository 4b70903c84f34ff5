use novus_gate_core::store::{AccountStore, CharacterStore, RealmFlags};
use novus_gate_node::config::GateConfig;

#[tokio::test]
async fn bundled_config_seeds_store() {
    let config = GateConfig::load("gate.toml").unwrap();
    assert_eq!(config.auth.listen, "127.0.0.1:3724");
    assert_eq!(config.relay.settings().max_body_size, 10240);

    let store = config.seed_store().unwrap();
    let credentials = store.credentials("TEST").await.unwrap().unwrap();
    assert_eq!(credentials.account_id, 1);

    let realms = store.realms().await.unwrap();
    assert_eq!(realms.len(), 1);
    assert_eq!(realms[0].flags, RealmFlags::RECOMMENDED);

    assert!(store.default_spawn(1, 1).await.unwrap().is_some());
    assert!(store.default_spawn(2, 1).await.unwrap().is_some());
    assert!(store.default_spawn(3, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn hex_credentials_are_used_verbatim() {
    let salt = "11".repeat(32);
    let verifier = "22".repeat(32);
    let text = format!(
        r#"
        [relay]
        realm_id = 3
        max_body_size = 512

        [[accounts]]
        id = 7
        username = "bob"
        salt = "{salt}"
        verifier = "{verifier}"
        "#
    );
    let config = GateConfig::parse(&text).unwrap();
    assert_eq!(config.relay.settings().realm_id, 3);
    assert_eq!(config.relay.settings().max_body_size, 512);
    assert_eq!(config.relay.connect, "127.0.0.1:10000");

    let store = config.seed_store().unwrap();
    let credentials = store.credentials("BOB").await.unwrap().unwrap();
    assert_eq!(credentials.account_id, 7);
    assert_eq!(credentials.salt, [0x11; 32]);
    assert_eq!(credentials.verifier, [0x22; 32]);
}

#[test]
fn missing_file_is_an_error() {
    let err = GateConfig::load("no-such-file.toml").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("no-such-file.toml"));
    assert!(message.contains("searched:"));
}

#[test]
fn absolute_path_loads_directly() {
    let path = std::env::temp_dir().join(format!("gate-node-{}.toml", std::process::id()));
    std::fs::write(&path, "[relay]\nrealm_id = 9\n").unwrap();

    let config = GateConfig::load(&path.to_string_lossy());
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.unwrap().relay.realm_id, 9);
}

#[test]
fn malformed_file_names_its_path() {
    let path = std::env::temp_dir().join(format!("gate-node-bad-{}.toml", std::process::id()));
    std::fs::write(&path, "[relay\n").unwrap();

    let result = GateConfig::load(&path.to_string_lossy());
    std::fs::remove_file(&path).unwrap();

    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains(&*path.to_string_lossy()));
}
