//! Removing references to one room from global account-data documents.
//!
//! Both functions edit the document in place and return whether anything
//! changed, so callers only write back documents that were modified.

use roompurge_types::id::RoomId;
use serde_json::Value;

/// Push-rule kinds whose rules are keyed by room id.
const ROOM_KEYED_RULE_KINDS: [&str; 2] = ["override", "room"];

/// Drop every rule under `global.override` and `global.room` whose
/// `rule_id` equals the room id.
///
/// Other rules keep their relative order. Missing or non-array lists are
/// left alone and never created.
pub fn prune_push_rules(push_rules: &mut Value, room_id: &RoomId) -> bool {
    let Some(global) = push_rules.get_mut("global") else {
        return false;
    };

    let mut changed = false;
    for kind in ROOM_KEYED_RULE_KINDS {
        let Some(rules) = global.get_mut(kind).and_then(Value::as_array_mut) else {
            continue;
        };
        let before = rules.len();
        rules.retain(|rule| rule.get("rule_id").and_then(Value::as_str) != Some(room_id.as_str()));
        changed |= rules.len() != before;
    }
    changed
}

/// Remove the room from every peer's list in an `m.direct` map.
///
/// A peer whose list becomes empty keeps its (empty) entry.
pub fn prune_direct_rooms(direct: &mut Value, room_id: &RoomId) -> bool {
    let Some(peers) = direct.as_object_mut() else {
        return false;
    };

    let mut changed = false;
    for rooms in peers.values_mut() {
        let Some(rooms) = rooms.as_array_mut() else {
            continue;
        };
        let before = rooms.len();
        rooms.retain(|r| r.as_str() != Some(room_id.as_str()));
        changed |= rooms.len() != before;
    }
    changed
}
