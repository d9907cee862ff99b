//! Input encoding and key mapping
//!
//! Button events go out as fixed 2-byte frames on the peer input
//! sub-channel: `u8 button_id | u8 edge` (1 = down, 0 = up). Buttons
//! outside the fixed vocabulary fall back to a tagged JSON message. When
//! the input sub-channel is not open, the *caller* sends the richer JSON
//! control message over the reliable channel instead; the encoder does not
//! hide that fallback.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// The fixed button vocabulary. Wire ids follow declaration order, 0-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
    L,
    R,
}

impl Button {
    pub const ALL: [Button; 10] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::L,
        Button::R,
    ];

    /// Wire identifier, 0-9.
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::Select => "SELECT",
            Button::Start => "START",
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
            Button::L => "L",
            Button::R => "R",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

/// Press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Up,
    Down,
}

impl Edge {
    pub fn wire(self) -> u8 {
        match self {
            Edge::Down => 1,
            Edge::Up => 0,
        }
    }

    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            Edge::Down
        } else {
            Edge::Up
        }
    }

    pub fn is_down(self) -> bool {
        matches!(self, Edge::Down)
    }
}

/// One button transition, encoded and discarded once sent.
#[derive(Debug, Clone)]
pub struct InputEvent {
    pub button: String,
    pub edge: Edge,
    pub timestamp: DateTime<Utc>,
}

impl InputEvent {
    pub fn new(button: impl Into<String>, edge: Edge) -> Self {
        Self {
            button: button.into(),
            edge,
            timestamp: Utc::now(),
        }
    }

    /// Encode for the peer input sub-channel.
    pub fn encode(&self) -> Bytes {
        encode(&self.button, self.edge)
    }
}

/// Encode a button transition: 2 bytes for the known vocabulary, tagged
/// JSON for anything else.
pub fn encode(button: &str, edge: Edge) -> Bytes {
    match Button::from_name(button) {
        Some(b) => Bytes::copy_from_slice(&[b.id(), edge.wire()]),
        None => {
            let msg = serde_json::json!({
                "type": "input",
                "button": button,
                "pressed": edge.is_down(),
            });
            Bytes::from(msg.to_string().into_bytes())
        }
    }
}

/// Persisted mapping from physical key names to buttons.
///
/// Process-wide and replaced as a whole: readers grab an `Arc` snapshot,
/// so a concurrent [`install_mapping`] can never produce a torn map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    map: HashMap<String, Button>,
}

impl KeyMapping {
    pub fn new(map: HashMap<String, Button>) -> Self {
        let map = map
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self { map }
    }

    /// Default handheld-style bindings.
    pub fn defaults() -> Self {
        let mut map = HashMap::new();
        map.insert("x".to_string(), Button::A);
        map.insert("z".to_string(), Button::B);
        map.insert("shift".to_string(), Button::Select);
        map.insert("enter".to_string(), Button::Start);
        map.insert("arrowup".to_string(), Button::Up);
        map.insert("arrowdown".to_string(), Button::Down);
        map.insert("arrowleft".to_string(), Button::Left);
        map.insert("arrowright".to_string(), Button::Right);
        map.insert("a".to_string(), Button::L);
        map.insert("s".to_string(), Button::R);
        Self { map }
    }

    pub fn lookup(&self, key: &str) -> Option<Button> {
        self.map.get(&key.to_ascii_lowercase()).copied()
    }

    pub fn as_map(&self) -> &HashMap<String, Button> {
        &self.map
    }
}

impl Default for KeyMapping {
    fn default() -> Self {
        Self::defaults()
    }
}

fn mapping_cell() -> &'static RwLock<Arc<KeyMapping>> {
    static CURRENT: OnceLock<RwLock<Arc<KeyMapping>>> = OnceLock::new();
    CURRENT.get_or_init(|| RwLock::new(Arc::new(KeyMapping::defaults())))
}

/// Snapshot of the current process-wide key mapping.
pub fn current_mapping() -> Arc<KeyMapping> {
    mapping_cell().read().clone()
}

/// Replace the process-wide key mapping in one step.
pub fn install_mapping(mapping: KeyMapping) {
    *mapping_cell().write() = Arc::new(mapping);
}

/// Translate a physical key through the current mapping.
pub fn map_key(key: &str) -> Option<Button> {
    current_mapping().lookup(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_ids_fixed() {
        let expected = ["A", "B", "SELECT", "START", "UP", "DOWN", "LEFT", "RIGHT", "L", "R"];
        for (id, name) in expected.iter().enumerate() {
            let button = Button::from_name(name).unwrap();
            assert_eq!(button.id(), id as u8);
            assert_eq!(Button::from_id(id as u8), Some(button));
        }
        assert!(Button::from_id(10).is_none());
    }

    #[test]
    fn test_encode_known_buttons() {
        assert_eq!(encode("A", Edge::Down).as_ref(), &[0, 1]);
        assert_eq!(encode("START", Edge::Up).as_ref(), &[3, 0]);
        assert_eq!(encode("r", Edge::Down).as_ref(), &[9, 1]);
    }

    #[test]
    fn test_encode_unknown_button_json_fallback() {
        let bytes = encode("TURBO", Edge::Down);
        assert!(bytes.len() > 2);

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "input");
        assert_eq!(value["button"], "TURBO");
        assert_eq!(value["pressed"], true);
    }

    #[test]
    fn test_input_event_encode() {
        let event = InputEvent::new("B", Edge::Up);
        assert_eq!(event.encode().as_ref(), &[1, 0]);
    }

    #[test]
    fn test_button_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Button::Select).unwrap(), "\"SELECT\"");
        let b: Button = serde_json::from_str("\"LEFT\"").unwrap();
        assert_eq!(b, Button::Left);
    }

    #[test]
    fn test_keymap_lookup_case_insensitive() {
        let mapping = KeyMapping::defaults();
        assert_eq!(mapping.lookup("ArrowUp"), Some(Button::Up));
        assert_eq!(mapping.lookup("X"), Some(Button::A));
        assert_eq!(mapping.lookup("q"), None);
    }

    #[test]
    fn test_mapping_replaced_as_a_whole() {
        let before = current_mapping();

        let mut map = HashMap::new();
        map.insert("j".to_string(), Button::A);
        install_mapping(KeyMapping::new(map));

        let after = current_mapping();
        assert_eq!(after.lookup("j"), Some(Button::A));
        // Old bindings are gone entirely, not merged.
        assert_eq!(after.lookup("arrowup"), None);
        // Earlier snapshots are unaffected.
        assert_eq!(before.lookup("x"), Some(Button::A));

        install_mapping(KeyMapping::defaults());
    }
}
