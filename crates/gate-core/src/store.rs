//! Persistence boundary for credentials, realms and characters.
//!
//! Every call is asynchronous. Sessions await them inline, so no further
//! input is parsed on a connection while one is outstanding.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use bitflags::bitflags;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::srp::{self, SessionKey};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: u32,
    pub salt: [u8; 32],
    pub verifier: [u8; 32],
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RealmFlags: u8 {
        const VERSION_MISMATCH = 0x01;
        const OFFLINE = 0x02;
        const SPECIFY_BUILD = 0x04;
        const RECOMMENDED = 0x20;
        const NEW = 0x40;
        const FULL = 0x80;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Realm {
    pub id: u8,
    pub name: String,
    pub address: String,
    pub realm_type: u8,
    pub flags: RealmFlags,
    pub timezone: u8,
    pub population: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnPosition {
    pub map_id: u32,
    pub zone_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub orientation: f32,
}

/// Appearance chosen on the character creation screen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewCharacter {
    pub name: String,
    pub race: u8,
    pub class: u8,
    pub gender: u8,
    pub skin: u8,
    pub face: u8,
    pub hair_style: u8,
    pub hair_color: u8,
    pub facial_style: u8,
    pub outfit_id: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub guid: u64,
    pub account_id: u32,
    pub name: String,
    pub race: u8,
    pub class: u8,
    pub gender: u8,
    pub skin: u8,
    pub face: u8,
    pub hair_style: u8,
    pub hair_color: u8,
    pub facial_style: u8,
    pub level: u8,
    pub position: SpawnPosition,
}

pub trait AccountStore: Send + Sync {
    /// Salt and verifier for `username`, or `None` when no such account exists.
    fn credentials<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<Credentials>>;

    fn store_session_key<'a>(&'a self, username: &'a str, key: SessionKey)
        -> StoreFuture<'a, ()>;

    fn session_key<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<SessionKey>>;

    fn realms(&self) -> StoreFuture<'_, Vec<Realm>>;

    /// Characters the account owns per realm id.
    fn realm_character_counts(&self, account_id: u32) -> StoreFuture<'_, HashMap<u8, u8>>;
}

pub trait CharacterStore: Send + Sync {
    fn characters(&self, account_id: u32) -> StoreFuture<'_, Vec<CharacterRecord>>;

    fn name_in_use<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool>;

    fn default_spawn(&self, race: u8, class: u8) -> StoreFuture<'_, Option<SpawnPosition>>;

    /// Inserts the character and returns its guid.
    fn create_character(
        &self,
        account_id: u32,
        character: NewCharacter,
        position: SpawnPosition,
    ) -> StoreFuture<'_, u64>;

    fn character_owner(&self, guid: u64) -> StoreFuture<'_, Option<u32>>;

    fn delete_character(&self, guid: u64) -> StoreFuture<'_, ()>;

    fn adjust_realm_characters(
        &self,
        account_id: u32,
        realm_id: u8,
        delta: i8,
    ) -> StoreFuture<'_, ()>;
}

#[derive(Debug, Clone)]
struct Account {
    username: String,
    credentials: Credentials,
    session_key: Option<SessionKey>,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    realms: Vec<Realm>,
    realm_characters: HashMap<(u32, u8), u8>,
    characters: BTreeMap<u64, CharacterRecord>,
    spawns: HashMap<(u8, u8), SpawnPosition>,
    next_guid: u64,
}

/// In-process store used by the binary and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account. The name and password are uppercased the same way
    /// the client does before deriving `x`.
    pub fn with_account(self, account_id: u32, username: &str, password: &str) -> Self {
        let username = username.to_uppercase();
        let salt: [u8; 32] = rand::random();
        let verifier = srp::make_verifier(&username, &password.to_uppercase(), &salt);
        self.with_credentials(
            &username,
            Credentials {
                account_id,
                salt,
                verifier,
            },
        )
    }

    /// Seeds an account from an already derived salt and verifier.
    pub fn with_credentials(mut self, username: &str, credentials: Credentials) -> Self {
        let username = username.to_uppercase();
        self.tables.get_mut().accounts.insert(
            username.clone(),
            Account {
                username,
                credentials,
                session_key: None,
            },
        );
        self
    }

    pub fn with_realm(mut self, realm: Realm) -> Self {
        self.tables.get_mut().realms.push(realm);
        self
    }

    pub fn with_spawn(mut self, race: u8, class: u8, position: SpawnPosition) -> Self {
        self.tables.get_mut().spawns.insert((race, class), position);
        self
    }

    pub async fn character(&self, guid: u64) -> Option<CharacterRecord> {
        self.tables.lock().await.characters.get(&guid).cloned()
    }
}

impl AccountStore for MemoryStore {
    fn credentials<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<Credentials>> {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            Ok(tables
                .accounts
                .get(&username.to_uppercase())
                .map(|account| account.credentials.clone()))
        })
    }

    fn store_session_key<'a>(
        &'a self,
        username: &'a str,
        key: SessionKey,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut tables = self.tables.lock().await;
            let account = tables
                .accounts
                .get_mut(&username.to_uppercase())
                .ok_or_else(|| StoreError::Conflict(format!("no account {username}")))?;
            account.session_key = Some(key);
            tracing::debug!(username = %account.username, "store.session_key.updated");
            Ok(())
        })
    }

    fn session_key<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<SessionKey>> {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            Ok(tables
                .accounts
                .get(&username.to_uppercase())
                .and_then(|account| account.session_key))
        })
    }

    fn realms(&self) -> StoreFuture<'_, Vec<Realm>> {
        Box::pin(async move { Ok(self.tables.lock().await.realms.clone()) })
    }

    fn realm_character_counts(&self, account_id: u32) -> StoreFuture<'_, HashMap<u8, u8>> {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            Ok(tables
                .realm_characters
                .iter()
                .filter(|((account, _), _)| *account == account_id)
                .map(|((_, realm), count)| (*realm, *count))
                .collect())
        })
    }
}

impl CharacterStore for MemoryStore {
    fn characters(&self, account_id: u32) -> StoreFuture<'_, Vec<CharacterRecord>> {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            Ok(tables
                .characters
                .values()
                .filter(|character| character.account_id == account_id)
                .cloned()
                .collect())
        })
    }

    fn name_in_use<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            Ok(tables
                .characters
                .values()
                .any(|character| character.name.eq_ignore_ascii_case(name)))
        })
    }

    fn default_spawn(&self, race: u8, class: u8) -> StoreFuture<'_, Option<SpawnPosition>> {
        Box::pin(async move { Ok(self.tables.lock().await.spawns.get(&(race, class)).copied()) })
    }

    fn create_character(
        &self,
        account_id: u32,
        character: NewCharacter,
        position: SpawnPosition,
    ) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut tables = self.tables.lock().await;
            if tables
                .characters
                .values()
                .any(|existing| existing.name.eq_ignore_ascii_case(&character.name))
            {
                return Err(StoreError::Conflict(format!(
                    "name {} already taken",
                    character.name
                )));
            }

            tables.next_guid += 1;
            let guid = tables.next_guid;
            tables.characters.insert(
                guid,
                CharacterRecord {
                    guid,
                    account_id,
                    name: character.name,
                    race: character.race,
                    class: character.class,
                    gender: character.gender,
                    skin: character.skin,
                    face: character.face,
                    hair_style: character.hair_style,
                    hair_color: character.hair_color,
                    facial_style: character.facial_style,
                    level: 1,
                    position,
                },
            );
            Ok(guid)
        })
    }

    fn character_owner(&self, guid: u64) -> StoreFuture<'_, Option<u32>> {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            Ok(tables.characters.get(&guid).map(|c| c.account_id))
        })
    }

    fn delete_character(&self, guid: u64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.lock().await;
            tables
                .characters
                .remove(&guid)
                .map(|_| ())
                .ok_or_else(|| StoreError::Conflict(format!("no character {guid}")))
        })
    }

    fn adjust_realm_characters(
        &self,
        account_id: u32,
        realm_id: u8,
        delta: i8,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.lock().await;
            let count = tables
                .realm_characters
                .entry((account_id, realm_id))
                .or_insert(0);
            *count = if delta >= 0 {
                count.saturating_add(delta.unsigned_abs())
            } else {
                count.saturating_sub(delta.unsigned_abs())
            };
            Ok(())
        })
    }
}
