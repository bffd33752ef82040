//! Inbound commands and their positional argument schemas.

use std::slice;

use vasset_record::{
    key_to_string, parse_hex_u64, string_to_key, AssetDraft, AssetType, Key, NO_KEY,
};

use crate::osc::{OscArg, OscMessage};
use crate::{address, WireError, WireResult};

/// A validated broker command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Resolve asset metadata by key, store first
    AssetFind { key: Key },
    /// Resolve asset metadata by name, origin only
    AssetFindName { name: String },
    /// Resolve metadata, then make the assembled file available locally
    AssetLoad { key: Key },
    /// Publish an asset whose payload is a local file
    AssetAddFile {
        serial: i32,
        draft: AssetDraft,
        path: String,
    },
    /// Publish an asset whose payload is the given string
    AssetAddString {
        serial: i32,
        draft: AssetDraft,
        data: String,
    },
    /// Create a named list
    ListAdd { name: String },
    /// Resolve a list key by name
    ListFind { name: String },
    /// Fetch the next page of a list's members
    ListNext { key: Key, token: u64 },
}

impl Command {
    /// Parse and validate a message against the command's argument schema.
    ///
    /// Unknown addresses, missing, mistyped or unconvertible arguments and
    /// trailing extra arguments are all rejected.
    pub fn parse(message: &OscMessage) -> WireResult<Self> {
        let mut args = Args::new(message);
        let command = match message.address.as_str() {
            address::ASSET_FIND => Command::AssetFind {
                key: args.key("key")?,
            },
            address::ASSET_FIND_NAME => Command::AssetFindName {
                name: args.string("name")?,
            },
            address::ASSET_LOAD => Command::AssetLoad {
                key: args.key("key")?,
            },
            address::ASSET_ADD_FILE => {
                let serial = args.int("serial")?;
                let draft = args.draft()?;
                Command::AssetAddFile {
                    serial,
                    draft,
                    path: args.string("path")?,
                }
            }
            address::ASSET_ADD_STRING => {
                let serial = args.int("serial")?;
                let draft = args.draft()?;
                Command::AssetAddString {
                    serial,
                    draft,
                    data: args.string("data")?,
                }
            }
            address::LIST_ADD => Command::ListAdd {
                name: args.string("name")?,
            },
            address::LIST_FIND => Command::ListFind {
                name: args.string("name")?,
            },
            address::LIST_NEXT => Command::ListNext {
                key: args.key("key")?,
                token: args.token("token")?,
            },
            other => return Err(WireError::UnknownAddress(other.to_string())),
        };
        args.finish()?;
        Ok(command)
    }

    pub fn address(&self) -> &'static str {
        match self {
            Command::AssetFind { .. } => address::ASSET_FIND,
            Command::AssetFindName { .. } => address::ASSET_FIND_NAME,
            Command::AssetLoad { .. } => address::ASSET_LOAD,
            Command::AssetAddFile { .. } => address::ASSET_ADD_FILE,
            Command::AssetAddString { .. } => address::ASSET_ADD_STRING,
            Command::ListAdd { .. } => address::LIST_ADD,
            Command::ListFind { .. } => address::LIST_FIND,
            Command::ListNext { .. } => address::LIST_NEXT,
        }
    }

    /// Encode as the message a client would send.
    pub fn to_message(&self) -> OscMessage {
        let msg = OscMessage::new(self.address());
        match self {
            Command::AssetFind { key } | Command::AssetLoad { key } => msg.arg(key_to_string(*key)),
            Command::AssetFindName { name }
            | Command::ListAdd { name }
            | Command::ListFind { name } => msg.arg(name.as_str()),
            Command::AssetAddFile {
                serial,
                draft,
                path: payload,
            }
            | Command::AssetAddString {
                serial,
                draft,
                data: payload,
            } => msg
                .arg(*serial)
                .arg(draft.asset_type.as_str())
                .arg(draft.name.as_str())
                .arg(optional_key_string(draft.author))
                .arg(optional_key_string(draft.deprecates))
                .arg(draft.list_ids.as_str())
                .arg(payload.as_str()),
            Command::ListNext { key, token } => {
                msg.arg(key_to_string(*key)).arg(key_to_string(*token))
            }
        }
    }
}

fn optional_key_string(key: Key) -> String {
    if key == NO_KEY {
        String::new()
    } else {
        key_to_string(key)
    }
}

/// Cursor over a message's arguments with per-argument error context.
pub(crate) struct Args<'a> {
    address: &'a str,
    iter: slice::Iter<'a, OscArg>,
    consumed: usize,
}

impl<'a> Args<'a> {
    pub(crate) fn new(message: &'a OscMessage) -> Self {
        Self {
            address: &message.address,
            iter: message.args.iter(),
            consumed: 0,
        }
    }

    fn next(&mut self, name: &'static str) -> WireResult<&'a OscArg> {
        let arg = self.iter.next().ok_or_else(|| WireError::MissingArgument {
            address: self.address.to_string(),
            name,
        })?;
        self.consumed += 1;
        Ok(arg)
    }

    fn wrong_type(&self, name: &'static str, expected: char, found: &OscArg) -> WireError {
        WireError::WrongType {
            address: self.address.to_string(),
            name,
            expected,
            found: found.tag(),
        }
    }

    fn invalid(&self, name: &'static str, value: &str) -> WireError {
        WireError::InvalidValue {
            address: self.address.to_string(),
            name,
            value: value.to_string(),
        }
    }

    pub(crate) fn string(&mut self, name: &'static str) -> WireResult<String> {
        match self.next(name)? {
            OscArg::Str(s) => Ok(s.clone()),
            other => Err(self.wrong_type(name, 's', other)),
        }
    }

    pub(crate) fn int(&mut self, name: &'static str) -> WireResult<i32> {
        match self.next(name)? {
            OscArg::Int(v) => Ok(*v),
            other => Err(self.wrong_type(name, 'i', other)),
        }
    }

    pub(crate) fn blob(&mut self, name: &'static str) -> WireResult<Vec<u8>> {
        match self.next(name)? {
            OscArg::Blob(b) => Ok(b.clone()),
            other => Err(self.wrong_type(name, 'b', other)),
        }
    }

    /// Hex key; zero and malformed text are rejected.
    pub(crate) fn key(&mut self, name: &'static str) -> WireResult<Key> {
        let text = self.string(name)?;
        string_to_key(&text).ok_or_else(|| self.invalid(name, &text))
    }

    /// Hex key that may be empty (meaning none) or zero.
    pub(crate) fn optional_key(&mut self, name: &'static str) -> WireResult<Key> {
        let text = self.string(name)?;
        if text.is_empty() {
            return Ok(NO_KEY);
        }
        parse_hex_u64(&text).ok_or_else(|| self.invalid(name, &text))
    }

    /// Pagination token: any hex value, `0` for the first page.
    fn token(&mut self, name: &'static str) -> WireResult<u64> {
        let text = self.string(name)?;
        parse_hex_u64(&text).ok_or_else(|| self.invalid(name, &text))
    }

    fn asset_type(&mut self, name: &'static str) -> WireResult<AssetType> {
        let text = self.string(name)?;
        AssetType::from_name(&text).ok_or_else(|| self.invalid(name, &text))
    }

    /// type, name, author, deprecates, list ids
    fn draft(&mut self) -> WireResult<AssetDraft> {
        Ok(AssetDraft {
            asset_type: self.asset_type("type")?,
            name: self.string("name")?,
            author: self.optional_key("author")?,
            deprecates: self.optional_key("deprecates")?,
            list_ids: self.string("list_ids")?,
        })
    }

    /// Fail if arguments remain past the schema.
    pub(crate) fn finish(mut self) -> WireResult<()> {
        let extra = self.iter.by_ref().count();
        if extra > 0 {
            return Err(WireError::ExcessArguments {
                address: self.address.to_string(),
                expected: self.consumed,
                found: self.consumed + extra,
            });
        }
        Ok(())
    }
}
