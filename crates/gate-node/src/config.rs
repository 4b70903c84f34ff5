use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use novus_gate_core::relay::RelaySettings;
use novus_gate_core::store::{Credentials, MemoryStore, Realm, RealmFlags, SpawnPosition};

/// Directory searched first for relative config paths.
pub const CONFIG_DIR_ENV: &str = "NOVUS_GATE_CONFIG_DIR";
/// Overrides `[auth] listen` after the file is parsed.
pub const AUTH_LISTEN_ENV: &str = "NOVUS_GATE_AUTH_LISTEN";
/// Overrides `[relay] connect` after the file is parsed.
pub const RELAY_CONNECT_ENV: &str = "NOVUS_GATE_RELAY_CONNECT";

#[derive(Debug, Default, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
    #[serde(default)]
    pub realms: Vec<RealmSeed>,
    #[serde(default)]
    pub spawns: Vec<SpawnSeed>,
}

#[derive(Debug, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_auth_listen")]
    pub listen: String,
    /// Connections that have not logged in within this many seconds are dropped.
    #[serde(default)]
    pub handshake_timeout_secs: Option<u64>,
}

impl AuthSection {
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            listen: default_auth_listen(),
            handshake_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_relay_connect")]
    pub connect: String,
    #[serde(default = "default_realm_id")]
    pub realm_id: u8,
    #[serde(default = "default_version")]
    pub version: u16,
    #[serde(default = "default_build")]
    pub build: u16,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl RelaySection {
    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            realm_id: self.realm_id,
            max_body_size: self.max_body_size,
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            connect: default_relay_connect(),
            realm_id: default_realm_id(),
            version: default_version(),
            build: default_build(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// A seeded account. Either `password`, or a hex `salt` and `verifier` pair.
#[derive(Debug, Deserialize)]
pub struct AccountSeed {
    pub id: u32,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub verifier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RealmSeed {
    pub id: u8,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub realm_type: u8,
    #[serde(default)]
    pub flags: u8,
    #[serde(default = "default_timezone")]
    pub timezone: u8,
    #[serde(default)]
    pub population: f32,
}

#[derive(Debug, Deserialize)]
pub struct SpawnSeed {
    pub race: u8,
    pub class: u8,
    pub map_id: u32,
    pub zone_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub orientation: f32,
}

fn default_auth_listen() -> String {
    "127.0.0.1:3724".to_string()
}

fn default_relay_connect() -> String {
    "127.0.0.1:10000".to_string()
}

fn default_realm_id() -> u8 {
    1
}

fn default_version() -> u16 {
    335
}

fn default_build() -> u16 {
    12340
}

fn default_max_body_size() -> usize {
    novus_gate_core::relay::DEFAULT_MAX_BODY_SIZE
}

fn default_timezone() -> u8 {
    1
}

impl AccountSeed {
    fn credentials(&self) -> anyhow::Result<Option<Credentials>> {
        let (Some(salt), Some(verifier)) = (&self.salt, &self.verifier) else {
            return Ok(None);
        };
        Ok(Some(Credentials {
            account_id: self.id,
            salt: decode_hex32(salt).with_context(|| format!("salt for {}", self.username))?,
            verifier: decode_hex32(verifier)
                .with_context(|| format!("verifier for {}", self.username))?,
        }))
    }
}

fn decode_hex32(text: &str) -> anyhow::Result<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(text.trim(), &mut out).context("expected 64 hex digits")?;
    Ok(out)
}

impl GateConfig {
    /// Reads, parses and applies environment overrides to a config file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let resolved = resolve_config_path(path)?;
        let text = std::fs::read_to_string(&resolved)
            .with_context(|| format!("read config {}", resolved.display()))?;
        let mut config =
            Self::parse(&text).with_context(|| format!("parse config {}", resolved.display()))?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid TOML")
    }

    /// Replaces socket addresses with non-empty values from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(listen) = lookup(AUTH_LISTEN_ENV) {
            self.auth.listen = listen;
        }
        if let Some(connect) = lookup(RELAY_CONNECT_ENV) {
            self.relay.connect = connect;
        }
    }

    /// Builds the in-memory store from the seed tables.
    pub fn seed_store(&self) -> anyhow::Result<MemoryStore> {
        let mut store = MemoryStore::new();

        for account in &self.accounts {
            store = match (account.credentials()?, &account.password) {
                (Some(credentials), _) => store.with_credentials(&account.username, credentials),
                (None, Some(password)) => store.with_account(account.id, &account.username, password),
                (None, None) => anyhow::bail!(
                    "account {} needs a password or a salt and verifier",
                    account.username
                ),
            };
        }

        for realm in &self.realms {
            store = store.with_realm(Realm {
                id: realm.id,
                name: realm.name.clone(),
                address: realm.address.clone(),
                realm_type: realm.realm_type,
                flags: RealmFlags::from_bits_truncate(realm.flags),
                timezone: realm.timezone,
                population: realm.population,
            });
        }

        for spawn in &self.spawns {
            store = store.with_spawn(
                spawn.race,
                spawn.class,
                SpawnPosition {
                    map_id: spawn.map_id,
                    zone_id: spawn.zone_id,
                    x: spawn.x,
                    y: spawn.y,
                    z: spawn.z,
                    orientation: spawn.orientation,
                },
            );
        }

        Ok(store)
    }
}

/// Where a config path may live, in lookup order.
///
/// Absolute paths are taken as given. Relative ones are tried under
/// `NOVUS_GATE_CONFIG_DIR`, the working directory, then the workspace
/// `config/` directory.
pub fn config_search_paths(path: &str) -> Vec<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        return vec![path.to_path_buf()];
    }

    let mut candidates = Vec::with_capacity(3);
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV) {
        candidates.push(PathBuf::from(dir).join(path));
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(path));
    }
    // gate-node sits at <workspace>/crates/gate-node.
    if let Some(root) = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2) {
        candidates.push(root.join("config").join(path));
    }
    candidates
}

fn resolve_config_path(path: &str) -> anyhow::Result<PathBuf> {
    let candidates = config_search_paths(path);
    if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(found.clone());
    }
    let searched: Vec<String> = candidates
        .iter()
        .map(|candidate| candidate.display().to_string())
        .collect();
    anyhow::bail!("config {path} not found (searched: {})", searched.join(", "))
}
