//! Identifier helpers and record encoding

use super::error::ApprovalError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, ApprovalError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(ApprovalError::encoding)?;
    let encode =
        bech32::encode::<Bech32m>(hrp, uuid7().as_bytes()).map_err(ApprovalError::encoding)?;
    Ok(encode)
}

// hyphenated uuid7, lexicographic order follows creation order
pub fn new_sequence_id() -> String {
    uuid7().to_string()
}

pub fn encode_record<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, ApprovalError> {
    minicbor::to_vec(value).map_err(ApprovalError::encoding)
}

pub fn decode_record<T>(bytes: &[u8]) -> Result<T, ApprovalError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(ApprovalError::encoding)
}
