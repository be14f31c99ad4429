//! Opaque message payloads.
//!
//! The engine routes messages; it never interprets them.  Serialization is
//! the application's concern, so a message is just owned bytes.

/// One message delivered to a twin's message handler.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message(Vec<u8>);

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Message(payload)
    }

    pub fn payload(&self) -> &[u8] {
        &self.0
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Message(payload)
    }
}

impl From<&[u8]> for Message {
    fn from(payload: &[u8]) -> Self {
        Message(payload.to_vec())
    }
}
