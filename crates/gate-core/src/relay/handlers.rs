//! Handlers for client packets forwarded over the relay.
//!
//! Each handler returns the reply to forward back for the same account, or
//! `None` when nothing is owed. Store calls complete before a reply is built.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::messages::{self, ForwardedPacket, UpdateAccountData};
use crate::buffer::ByteCursor;
use crate::error::{BufferError, StoreError};
use crate::opcode::{CharResponse, Opcode};
use crate::store::{CharacterStore, NewCharacter};

/// Highest account data slot the client may update.
const MAX_ACCOUNT_DATA_TYPE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub opcode: u16,
    pub body: Vec<u8>,
}

impl Reply {
    fn new(opcode: u16, body: Vec<u8>) -> Self {
        Self { opcode, body }
    }
}

/// Context shared by every handler on one relay link.
pub struct HandlerContext<'a> {
    pub store: &'a dyn CharacterStore,
    pub realm_id: u8,
}

pub async fn handle(ctx: &HandlerContext<'_>, packet: &ForwardedPacket) -> Option<Reply> {
    let account_id = packet.header.account_id;
    let mut body = ByteCursor::from(packet.body.as_slice());

    let result = match packet.header.opcode {
        Opcode::CMSG_READY_FOR_ACCOUNT_DATA_TIMES => Ok(Some(account_data_times())),
        Opcode::CMSG_UPDATE_ACCOUNT_DATA => update_account_data(&mut body),
        Opcode::CMSG_REALM_SPLIT => realm_split(&mut body),
        Opcode::CMSG_CHAR_ENUM => Ok(Some(char_enum(ctx, account_id).await)),
        Opcode::CMSG_CHAR_CREATE => char_create(ctx, account_id, &mut body).await,
        Opcode::CMSG_CHAR_DELETE => char_delete(ctx, account_id, &mut body).await,
        opcode => {
            debug!(
                account_id,
                opcode,
                size = packet.body.len(),
                "relay.forward.unhandled"
            );
            Ok(None)
        }
    };

    result.unwrap_or_else(|err| {
        warn!(
            account_id,
            opcode = packet.header.opcode,
            error = %err,
            "relay.forward.malformed"
        );
        None
    })
}

fn server_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

fn account_data_times() -> Reply {
    Reply::new(
        Opcode::SMSG_ACCOUNT_DATA_TIMES,
        messages::account_data_times(server_time()),
    )
}

fn update_account_data(body: &mut ByteCursor) -> Result<Option<Reply>, BufferError> {
    let request = UpdateAccountData::decode(body)?;
    if request.data_type > MAX_ACCOUNT_DATA_TYPE {
        warn!(
            data_type = request.data_type,
            "relay.account_data.bad_type"
        );
        return Ok(None);
    }
    Ok(Some(Reply::new(
        Opcode::SMSG_UPDATE_ACCOUNT_DATA_COMPLETE,
        messages::update_account_data_complete(request.data_type),
    )))
}

fn realm_split(body: &mut ByteCursor) -> Result<Option<Reply>, BufferError> {
    let request = body.read_u32()?;
    Ok(Some(Reply::new(
        Opcode::SMSG_REALM_SPLIT,
        messages::realm_split(request),
    )))
}

async fn char_enum(ctx: &HandlerContext<'_>, account_id: u32) -> Reply {
    let characters = ctx.store.characters(account_id).await.unwrap_or_else(|err| {
        warn!(account_id, error = %err, "relay.char_enum.store_failed");
        Vec::new()
    });
    if characters.len() > messages::MAX_LISTED_CHARACTERS {
        warn!(
            account_id,
            count = characters.len(),
            "relay.char_enum.truncated"
        );
    }
    debug!(account_id, count = characters.len(), "relay.char_enum.sent");
    Reply::new(Opcode::SMSG_CHAR_ENUM, messages::char_enum(&characters))
}

/// Lowercases the name and capitalises its first letter.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn char_response(opcode: u16, code: u8) -> Reply {
    Reply::new(opcode, vec![code])
}

async fn char_create(
    ctx: &HandlerContext<'_>,
    account_id: u32,
    body: &mut ByteCursor,
) -> Result<Option<Reply>, BufferError> {
    let mut character = messages::decode_char_create(body)?;
    let code = create_character(ctx, account_id, &mut character).await;
    info!(
        account_id,
        name = %character.name,
        code,
        "relay.char_create.result"
    );
    Ok(Some(char_response(Opcode::SMSG_CHAR_CREATE, code)))
}

async fn create_character(
    ctx: &HandlerContext<'_>,
    account_id: u32,
    character: &mut NewCharacter,
) -> u8 {
    if character.name.is_empty() {
        return CharResponse::CREATE_FAILED;
    }

    match ctx.store.name_in_use(&character.name).await {
        Ok(false) => {}
        Ok(true) => return CharResponse::CREATE_NAME_IN_USE,
        Err(err) => {
            warn!(account_id, error = %err, "relay.char_create.store_failed");
            return CharResponse::CREATE_ERROR;
        }
    }

    character.name = normalize_name(&character.name);

    let spawn = match ctx
        .store
        .default_spawn(character.race, character.class)
        .await
    {
        Ok(Some(spawn)) => spawn,
        Ok(None) => return CharResponse::CREATE_DISABLED,
        Err(err) => {
            warn!(account_id, error = %err, "relay.char_create.store_failed");
            return CharResponse::CREATE_ERROR;
        }
    };

    match ctx
        .store
        .create_character(account_id, character.clone(), spawn)
        .await
    {
        Ok(guid) => debug!(account_id, guid, "relay.char_create.inserted"),
        Err(StoreError::Conflict(_)) => return CharResponse::CREATE_NAME_IN_USE,
        Err(err) => {
            warn!(account_id, error = %err, "relay.char_create.store_failed");
            return CharResponse::CREATE_ERROR;
        }
    }

    if let Err(err) = ctx
        .store
        .adjust_realm_characters(account_id, ctx.realm_id, 1)
        .await
    {
        warn!(account_id, error = %err, "relay.char_create.count_failed");
    }
    CharResponse::CREATE_SUCCESS
}

async fn char_delete(
    ctx: &HandlerContext<'_>,
    account_id: u32,
    body: &mut ByteCursor,
) -> Result<Option<Reply>, BufferError> {
    let guid = body.read_u64()?;
    let code = delete_character(ctx, account_id, guid).await;
    info!(account_id, guid, code, "relay.char_delete.result");
    Ok(Some(char_response(Opcode::SMSG_CHAR_DELETE, code)))
}

async fn delete_character(ctx: &HandlerContext<'_>, account_id: u32, guid: u64) -> u8 {
    match ctx.store.character_owner(guid).await {
        Ok(Some(owner)) if owner == account_id => {}
        Ok(Some(owner)) => {
            warn!(account_id, guid, owner, "relay.char_delete.not_owner");
            return CharResponse::DELETE_FAILED;
        }
        Ok(None) => return CharResponse::DELETE_FAILED,
        Err(err) => {
            warn!(account_id, error = %err, "relay.char_delete.store_failed");
            return CharResponse::DELETE_FAILED;
        }
    }

    if let Err(err) = ctx.store.delete_character(guid).await {
        warn!(account_id, guid, error = %err, "relay.char_delete.store_failed");
        return CharResponse::DELETE_FAILED;
    }

    if let Err(err) = ctx
        .store
        .adjust_realm_characters(account_id, ctx.realm_id, -1)
        .await
    {
        warn!(account_id, error = %err, "relay.char_delete.count_failed");
    }
    CharResponse::DELETE_SUCCESS
}
