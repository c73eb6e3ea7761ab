//! Searching the layout tree
//!
//! `get_tree` returns the whole container hierarchy: outputs, workspaces,
//! split containers and windows, each with its children under `nodes` and
//! `floating_nodes`. [`filter`] picks out the nodes whose fields match a set
//! of criteria, e.g. leaf windows (`nodes == []`) that have focus:
//!
//! ```ignore
//! let tree = conn.get(MessageType::GetTree, "").await?.into_json().unwrap_or_default();
//! let focused = tree::filter(&tree, &[("nodes", json!([])), ("focused", json!(true))]);
//! ```

use serde_json::Value;

const CHILD_KEYS: [&str; 2] = ["nodes", "floating_nodes"];

/// Every node under `tree` whose fields equal all of `criteria`
///
/// `tree` is a single node or a list of nodes, so the result of one search
/// can be narrowed by another. Nodes are visited depth first, parents
/// before their children, and the children of a match are searched too.
/// A node lacking one of the fields does not match; empty criteria match
/// every node.
pub fn filter<'a>(tree: &'a Value, criteria: &[(&str, Value)]) -> Vec<&'a Value> {
    let mut matches = Vec::new();
    collect(tree, criteria, &mut matches);
    matches
}

fn collect<'a>(tree: &'a Value, criteria: &[(&str, Value)], matches: &mut Vec<&'a Value>) {
    match tree {
        Value::Array(nodes) => {
            for node in nodes {
                collect(node, criteria, matches);
            }
        }
        Value::Object(node) => {
            if criteria
                .iter()
                .all(|(key, expected)| node.get(*key) == Some(expected))
            {
                matches.push(tree);
            }
            for key in CHILD_KEYS {
                if let Some(children) = node.get(key) {
                    collect(children, criteria, matches);
                }
            }
        }
        _ => {}
    }
}
