use std::fmt::{Display, Formatter};
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::impl_sqlx_text_type_encode_decode;

pub const RECORD_ID_LEN: usize = 24;

/// Opaque record identifier, 24 lowercase hex digits.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Debug)]
#[serde(transparent)]
pub struct RecordId(pub String);
impl_sqlx_text_type_encode_decode!(RecordId);

impl RecordId {
    pub fn generate() -> Self {
        let bytes: [u8; RECORD_ID_LEN / 2] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == RECORD_ID_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b.to_ascii_lowercase()));
        valid.then(|| Self(s.to_ascii_lowercase()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
