//! Status request/reply messages exchanged with the processing microservices.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct KeyPair {
    #[prost(string, optional, tag = "1")]
    pub main_key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub sub_key: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatusRequest {
    #[prost(uint32, optional, tag = "1")]
    pub num_records: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub time_length_milli: Option<u32>,
    #[prost(message, repeated, tag = "3")]
    pub keys: Vec<KeyPair>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatusItem {
    #[prost(string, optional, tag = "1")]
    pub timestamp: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub status: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub error_flag: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatusKey {
    #[prost(string, optional, tag = "1")]
    pub main_key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub sub_key: Option<String>,
    #[prost(message, repeated, tag = "3")]
    pub status: Vec<StatusItem>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatusInformation {
    #[prost(message, repeated, tag = "1")]
    pub record: Vec<StatusKey>,
}

impl StatusRequest {
    /// The request every poll cycle sends: the latest record of every key
    pub fn latest() -> Self {
        Self {
            num_records: Some(1),
            ..Default::default()
        }
    }
}

impl StatusKey {
    pub fn main(&self) -> &str {
        self.main_key.as_deref().unwrap_or_default()
    }

    pub fn sub(&self) -> &str {
        self.sub_key.as_deref().unwrap_or_default()
    }

    /// Text of the first status item, empty when the record carries none
    pub fn first_status(&self) -> &str {
        self.status
            .first()
            .and_then(|item| item.status.as_deref())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_request_encodes_num_records() {
        let bytes = StatusRequest::latest().encode_to_vec();
        // field 1, varint, value 1
        assert_eq!(bytes, vec![0x08, 0x01]);
    }

    #[test]
    fn test_first_status_defaults_to_empty() {
        let key = StatusKey {
            main_key: Some("Locator".into()),
            sub_key: None,
            status: vec![],
        };
        assert_eq!(key.main(), "Locator");
        assert_eq!(key.sub(), "");
        assert_eq!(key.first_status(), "");
    }
}
