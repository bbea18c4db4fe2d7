use models::content::{
    AggregateContent, Content, ForgetContent, InstanceContent, PostContent, ProgramContent,
    StoreContent,
};
use models::{MessageProcessingError, MessageType};
use serde_json::Value;

/// Parses a stored message's raw JSON content back into its typed `Content`
/// variant. The FORGET handler (spec §4.9) needs this to reconstruct a
/// target message and replay it through that type's own `forget_message`.
pub fn decode_content(
    message_type: MessageType,
    raw: Value,
) -> Result<Content, MessageProcessingError> {
    let invalid = |e: serde_json::Error| MessageProcessingError::InvalidMessageFormat(e.to_string());
    Ok(match message_type {
        MessageType::Aggregate => {
            Content::Aggregate(serde_json::from_value::<AggregateContent>(raw).map_err(invalid)?)
        }
        MessageType::Post => Content::Post(serde_json::from_value::<PostContent>(raw).map_err(invalid)?),
        MessageType::Store => {
            Content::Store(serde_json::from_value::<StoreContent>(raw).map_err(invalid)?)
        }
        MessageType::Program => {
            Content::Program(serde_json::from_value::<ProgramContent>(raw).map_err(invalid)?)
        }
        MessageType::Instance => {
            Content::Instance(serde_json::from_value::<InstanceContent>(raw).map_err(invalid)?)
        }
        MessageType::Forget => {
            Content::Forget(serde_json::from_value::<ForgetContent>(raw).map_err(invalid)?)
        }
    })
}
