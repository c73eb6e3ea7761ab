//! Mapping named operations onto requests
//!
//! `resolve("get_tree", &[])` asks for the tree, anything else becomes a
//! command: `resolve("move__container", &["to", "workspace", "3"])` sends
//! `move container to workspace 3`. A double underscore stands for a space so
//! that multi-word verbs can be written as identifiers.
//!
//! Commands can be aimed at specific containers with criteria:
//! `resolve_with_criteria("focus", &[("con_id", "94")], &[])` sends
//! `[con_id="94"] focus`.

use serde_json::Value;

use crate::types::{MessageType, Payload};

/// Turn an operation name and its arguments into a message type and payload
pub fn resolve<A: AsRef<str>>(name: &str, args: &[A]) -> (MessageType, String) {
    resolve_with_criteria::<&str, &str, A>(name, &[], args)
}

/// Like [`resolve`], with criteria selecting the containers a command
/// applies to
///
/// Criteria are written as `[key="value" ...]` in front of the command.
/// They mean nothing to the other message types and are ignored there.
pub fn resolve_with_criteria<K, V, A>(
    name: &str,
    criteria: &[(K, V)],
    args: &[A],
) -> (MessageType, String)
where
    K: AsRef<str>,
    V: AsRef<str>,
    A: AsRef<str>,
{
    let args = args.iter().map(AsRef::as_ref);

    if let Some(message_type) = MessageType::from_name(name) {
        return (message_type, args.collect::<Vec<_>>().join(" "));
    }

    let selector = selector(criteria);
    let verb = name.replace("__", " ");
    let payload = [selector.as_str(), verb.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .chain(args)
        .collect::<Vec<_>>()
        .join(" ");
    (MessageType::Command, payload)
}

fn selector<K: AsRef<str>, V: AsRef<str>>(criteria: &[(K, V)]) -> String {
    if criteria.is_empty() {
        return String::new();
    }
    let pairs = criteria
        .iter()
        .map(|(key, value)| {
            let value = value.as_ref().replace('\\', "\\\\").replace('"', "\\\"");
            format!("{}=\"{}\"", key.as_ref(), value)
        })
        .collect::<Vec<_>>();
    format!("[{}]", pairs.join(" "))
}

/// Read the `success` flag of a reply
///
/// Works for a single object (`{"success": true}`) and for the list of
/// results i3 returns for commands. Returns `None` when the reply carries no
/// flag.
pub fn success(reply: &Payload) -> Option<bool> {
    match reply.as_json()? {
        Value::Object(map) => map.get("success").and_then(Value::as_bool),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.get("success").and_then(Value::as_bool))
            .collect::<Option<Vec<bool>>>()
            .map(|flags| flags.into_iter().all(|ok| ok)),
        _ => None,
    }
}
