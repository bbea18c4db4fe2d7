use models::MessageType;
use serde_json::Value;

/// Key under which an address publishes its delegation list (spec §4.4):
/// an AGGREGATE at `(owner = content.address, key = "security")` whose
/// content carries `{"authorizations": [{"address": ..., "types": [...]}]}`.
const SECURITY_AGGREGATE_KEY: &str = "security";

/// Default permission check: the sender must equal the content's address,
/// unless the address has delegated to the sender via its `security`
/// aggregate.
pub async fn check_permissions(
    sender: &str,
    content_address: &str,
    message_type: MessageType,
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> Result<bool, sqlx::Error> {
    if sender == content_address {
        return Ok(true);
    }

    let Some(aggregate) =
        db::aggregates::get(content_address, SECURITY_AGGREGATE_KEY, txn).await?
    else {
        return Ok(false);
    };

    Ok(is_authorized(&aggregate.content.0, sender, message_type))
}

fn is_authorized(security_content: &Value, sender: &str, message_type: MessageType) -> bool {
    let Some(authorizations) = security_content.get("authorizations").and_then(Value::as_array)
    else {
        return false;
    };

    authorizations.iter().any(|entry| {
        let same_address = entry.get("address").and_then(Value::as_str) == Some(sender);
        if !same_address {
            return false;
        }
        match entry.get("types").and_then(Value::as_array) {
            // Absent `types` means "all message types".
            None => true,
            Some(types) => types
                .iter()
                .any(|t| t.as_str() == Some(message_type.as_str())),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unscoped_delegation_grants_everything() {
        let content = json!({"authorizations": [{"address": "0xdelegate"}]});
        assert!(is_authorized(&content, "0xdelegate", MessageType::Post));
    }

    #[test]
    fn scoped_delegation_respects_type_list() {
        let content = json!({"authorizations": [{"address": "0xdelegate", "types": ["POST"]}]});
        assert!(is_authorized(&content, "0xdelegate", MessageType::Post));
        assert!(!is_authorized(&content, "0xdelegate", MessageType::Store));
    }

    #[test]
    fn unknown_sender_is_denied() {
        let content = json!({"authorizations": [{"address": "0xdelegate"}]});
        assert!(!is_authorized(&content, "0xother", MessageType::Post));
    }
}
