//! Mind map trees parsed from model output.

use std::fmt;

use log::warn;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyError};

/// Reserved id of the node returned when a map could not be generated.
pub const ERROR_NODE_ID: &str = "error";

/// Deepest level kept when reading a tree; anything below is dropped.
///
/// [`MindMapNode::parse`] turns off serde_json's own nesting limit (128, about
/// 63 mind map levels) so that this cap alone decides how deep trees are
/// handled. Subtrees past it are skipped without being built.
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindMapNode {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub children: Vec<MindMapNode>,
}

impl MindMapNode {
    /// The inline failure node shown in place of a map.
    pub fn error(label: impl Into<String>) -> Self {
        Self {
            id: ERROR_NODE_ID.to_string(),
            label: label.into(),
            details: Some("Please try again.".to_string()),
            children: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.id == ERROR_NODE_ID
    }

    /// Levels in the tree, counting the root.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(MindMapNode::depth).max().unwrap_or(0)
    }

    /// Parses a model payload into a tree, truncated at [`MAX_DEPTH`].
    pub fn parse(payload: &str) -> Result<Self> {
        let mut json = serde_json::Deserializer::from_str(payload);
        json.disable_recursion_limit();

        NodeSeed { depth: 1 }
            .deserialize(serde_stacker::Deserializer::new(&mut json))
            .and_then(|root| json.end().map(|()| root))
            .map_err(|e| StudyError::MalformedResponse(format!("mind map is not valid JSON: {e}")))
    }
}

/// Reads one node at `depth` (the root is 1).
#[derive(Clone, Copy)]
struct NodeSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for NodeSeed {
    type Value = MindMapNode;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<MindMapNode, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed {
    type Value = MindMapNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mind map node object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<MindMapNode, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut id = None;
        let mut label = None;
        let mut details = None;
        let mut children = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "id" => id = Some(map.next_value::<NodeId>()?.0),
                "label" => label = Some(map.next_value::<String>()?),
                "details" => details = map.next_value::<Option<String>>()?,
                "children" => {
                    children = Some(map.next_value_seed(ChildrenSeed { depth: self.depth })?)
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let id: String = id.ok_or_else(|| de::Error::missing_field("id"))?;
        let label = label
            .ok_or_else(|| de::Error::custom(format!("mind map node '{id}' has no label")))?;

        Ok(MindMapNode {
            id,
            label,
            details,
            children: children.unwrap_or_default(),
        })
    }
}

/// Node ids; models sometimes emit numbers.
struct NodeId(String);

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NodeIdVisitor;

        impl<'de> Visitor<'de> for NodeIdVisitor {
            type Value = NodeId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or numeric node id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<NodeId, E> {
                Ok(NodeId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<NodeId, E> {
                Ok(NodeId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<NodeId, E> {
                Ok(NodeId(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<NodeId, E> {
                Ok(NodeId(v.to_string()))
            }
        }

        deserializer.deserialize_any(NodeIdVisitor)
    }
}

/// The `children` of a node at `depth`: an array, or null for none.
struct ChildrenSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for ChildrenSeed {
    type Value = Vec<MindMapNode>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Vec<MindMapNode>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ChildrenSeed {
    type Value = Vec<MindMapNode>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of child nodes")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Vec<MindMapNode>, E> {
        Ok(Vec::new())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Vec<MindMapNode>, E> {
        Ok(Vec::new())
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Vec<MindMapNode>, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut children = Vec::new();

        if self.depth >= MAX_DEPTH {
            let mut dropped = 0usize;
            while seq.next_element::<IgnoredAny>()?.is_some() {
                dropped += 1;
            }
            if dropped > 0 {
                warn!("Mind map deeper than {MAX_DEPTH} levels, dropped {dropped} subtree(s)");
            }
            return Ok(children);
        }

        let child = NodeSeed {
            depth: self.depth + 1,
        };
        while let Some(node) = seq.next_element_seed(child)? {
            children.push(node);
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_keeps_labels_details_and_order() {
        let tree = MindMapNode {
            id: "root".to_string(),
            label: "Cell Biology".to_string(),
            details: Some("Study of cells".to_string()),
            children: vec![
                MindMapNode {
                    id: "1".to_string(),
                    label: "Organelles".to_string(),
                    details: None,
                    children: vec![],
                },
                MindMapNode {
                    id: "2".to_string(),
                    label: "Membranes".to_string(),
                    details: Some("Phospholipid bilayer".to_string()),
                    children: vec![],
                },
            ],
        };

        let payload = serde_json::to_string(&tree).unwrap();
        let parsed = MindMapNode::parse(&payload).unwrap();

        assert_eq!(parsed, tree);
        assert_eq!(parsed.children[0].label, "Organelles");
        assert_eq!(parsed.children[1].details.as_deref(), Some("Phospholipid bilayer"));
    }

    #[test]
    fn missing_children_and_numeric_ids_are_accepted() {
        let parsed = MindMapNode::parse(
            &json!({
                "id": "root",
                "label": "Tissues",
                "children": [{"id": 7, "label": "Epithelial", "children": null}]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(parsed.children[0].id, "7");
        assert!(parsed.children[0].children.is_empty());
        assert_eq!(parsed.depth(), 2);
    }

    #[test]
    fn children_must_be_an_array() {
        let err = MindMapNode::parse(
            &json!({"id": "root", "label": "x", "children": {"id": "1", "label": "y"}}).to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, StudyError::MalformedResponse(_)));
    }

    #[test]
    fn nodes_need_id_and_label() {
        assert!(MindMapNode::parse(r#"{"label": "no id"}"#).is_err());
        assert!(MindMapNode::parse(r#"{"id": "root"}"#).is_err());
        assert!(MindMapNode::parse(r#"["root"]"#).is_err());
        assert!(MindMapNode::parse("").is_err());
    }

    #[test]
    fn deep_trees_are_truncated() {
        let mut value = json!({"id": "leaf", "label": "leaf"});
        for level in 0..(MAX_DEPTH + 10) {
            value = json!({"id": level.to_string(), "label": "n", "children": [value]});
        }

        let parsed = MindMapNode::parse(&value.to_string()).unwrap();
        assert_eq!(parsed.depth(), MAX_DEPTH);
    }

    /// `levels` nested nodes, built as text so no deep value is ever held.
    fn nested_payload(levels: usize) -> String {
        let open = r#"{"id":"n","label":"level","children":["#;
        let mut payload = open.repeat(levels);
        payload.push_str(r#"{"id":"leaf","label":"leaf"}"#);
        payload.push_str(&"]}".repeat(levels));
        payload
    }

    #[test]
    fn trees_past_the_json_nesting_limit_are_truncated_not_rejected() {
        let parsed = MindMapNode::parse(&nested_payload(70)).unwrap();
        assert_eq!(parsed.depth(), MAX_DEPTH);
        assert_eq!(parsed.label, "level");
    }

    #[test]
    fn pathologically_deep_trees_do_not_overflow() {
        let parsed = MindMapNode::parse(&nested_payload(20_000)).unwrap();
        assert_eq!(parsed.depth(), MAX_DEPTH);
    }

    #[test]
    fn truncated_input_is_still_malformed() {
        let mut payload = nested_payload(70);
        payload.truncate(payload.len() - 3);
        assert!(matches!(
            MindMapNode::parse(&payload),
            Err(StudyError::MalformedResponse(_))
        ));
        assert!(MindMapNode::parse(r#"{"id": "root", "label": "x"} trailing"#).is_err());
    }

    #[test]
    fn error_node_is_recognizable() {
        let node = MindMapNode::error("Error generating map");
        assert!(node.is_error());
        assert_eq!(node.details.as_deref(), Some("Please try again."));
        assert!(node.children.is_empty());
    }
}
