/// Auth-facing commands (first byte of every client message).
pub struct AuthCommand;

impl AuthCommand {
    pub const LOGON_CHALLENGE: u8 = 0x00;
    pub const LOGON_PROOF: u8 = 0x01;
    pub const RECONNECT_CHALLENGE: u8 = 0x02;
    pub const RECONNECT_PROOF: u8 = 0x03;
    pub const REALM_LIST: u8 = 0x10;
}

/// Result byte carried by auth responses.
pub struct AuthResult;

impl AuthResult {
    pub const SUCCESS: u8 = 0x00;
    pub const UNKNOWN_ACCOUNT: u8 = 0x04;
    pub const DB_BUSY: u8 = 0x08;
}

/// Node-to-node relay commands.
pub struct RelayCommand;

impl RelayCommand {
    pub const CHALLENGE: u8 = 0x00;
    pub const PROOF: u8 = 0x01;
    pub const FORWARD_PACKET: u8 = 0x02;
}

/// Sub-opcodes carried inside forwarded packets (WotLK 3.3.5a opcode map).
pub struct Opcode;

impl Opcode {
    // Character screen.
    pub const CMSG_CHAR_CREATE: u16 = 0x036;
    pub const CMSG_CHAR_ENUM: u16 = 0x037;
    pub const CMSG_CHAR_DELETE: u16 = 0x038;
    pub const SMSG_CHAR_CREATE: u16 = 0x03A;
    pub const SMSG_CHAR_ENUM: u16 = 0x03B;
    pub const SMSG_CHAR_DELETE: u16 = 0x03C;

    // Account data.
    pub const SMSG_ACCOUNT_DATA_TIMES: u16 = 0x209;
    pub const CMSG_UPDATE_ACCOUNT_DATA: u16 = 0x20B;
    pub const SMSG_UPDATE_ACCOUNT_DATA_COMPLETE: u16 = 0x463;
    pub const CMSG_READY_FOR_ACCOUNT_DATA_TIMES: u16 = 0x4FF;

    pub const SMSG_REALM_SPLIT: u16 = 0x38B;
    pub const CMSG_REALM_SPLIT: u16 = 0x38C;
}

/// Character screen response codes understood by the 3.3.5a client.
pub struct CharResponse;

impl CharResponse {
    pub const CREATE_SUCCESS: u8 = 47;
    pub const CREATE_ERROR: u8 = 48;
    pub const CREATE_FAILED: u8 = 49;
    pub const CREATE_NAME_IN_USE: u8 = 50;
    pub const CREATE_DISABLED: u8 = 51;
    pub const DELETE_SUCCESS: u8 = 71;
    pub const DELETE_FAILED: u8 = 72;
}
