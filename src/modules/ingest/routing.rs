use serde::{Deserialize, Serialize};

use super::models::is_valid_device_id;
use super::payload::{self, Fields};
use crate::shared::errors::IngestError;

/// Where the device id and message kind sit in a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicLayout {
    /// `<namespace>/<device_id>/<kind>`
    #[default]
    DeviceKind,
    /// `<namespace>/<kind>/<device_id>`
    KindDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Data,
    Image,
}

impl MessageKind {
    pub fn parse(raw: &str) -> Option<MessageKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "data" => Some(MessageKind::Data),
            "image" => Some(MessageKind::Image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub device_id: String,
    /// `None` when a kind was given but is not one this store understands.
    pub kind: Option<MessageKind>,
}

impl TopicLayout {
    /// Split a topic into its (device id, kind) segments, either may be absent.
    pub fn split<'a>(&self, topic: &'a str) -> (Option<&'a str>, Option<&'a str>) {
        let segments: Vec<&str> = topic.split('/').collect();
        let segment = |i: usize| segments.get(i).copied().filter(|s| !s.is_empty());

        match self {
            TopicLayout::DeviceKind => {
                let kind = if segments.len() >= 3 {
                    segments.last().copied().filter(|s| !s.is_empty())
                } else {
                    None
                };
                (segment(1), kind)
            }
            TopicLayout::KindDevice => (segment(2), segment(1)),
        }
    }
}

/// Work out which device a message belongs to and what it carries.
///
/// The topic wins over payload fields. When neither names a kind the message
/// is treated as data, which is what devices publishing to a flat topic send.
pub fn resolve(layout: TopicLayout, topic: &str, fields: &Fields) -> Result<Route, IngestError> {
    let (topic_device, topic_kind) = layout.split(topic);

    let device_id = match topic_device {
        Some(id) => Some(id.to_string()),
        None => payload::device_id(fields),
    }
    .filter(|id| is_valid_device_id(id))
    .ok_or_else(|| IngestError::UnroutableMessage(topic.to_string()))?;

    let kind = match topic_kind.or_else(|| payload::kind(fields)) {
        Some(raw) => MessageKind::parse(raw),
        None => Some(MessageKind::Data),
    };

    Ok(Route { device_id, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn device_kind_layout_reads_second_and_last_segment() {
        let route = resolve(TopicLayout::DeviceKind, "helm/h-01/image", &Fields::new()).unwrap();
        assert_eq!(route.device_id, "h-01");
        assert_eq!(route.kind, Some(MessageKind::Image));
    }

    #[test]
    fn kind_device_layout_matches_legacy_topics() {
        let route = resolve(TopicLayout::KindDevice, "helm/data/3", &Fields::new()).unwrap();
        assert_eq!(route.device_id, "3");
        assert_eq!(route.kind, Some(MessageKind::Data));
    }

    #[test]
    fn device_falls_back_to_payload_id() {
        let f = fields(json!({"id": "h-09"}));
        let route = resolve(TopicLayout::KindDevice, "helm/image", &f).unwrap();
        assert_eq!(route.device_id, "h-09");
        assert_eq!(route.kind, Some(MessageKind::Image));
    }

    #[test]
    fn missing_identity_is_unroutable() {
        let err = resolve(TopicLayout::KindDevice, "helm/data", &Fields::new()).unwrap_err();
        assert_eq!(err, IngestError::UnroutableMessage("helm/data".into()));
    }

    #[test]
    fn payload_id_that_is_not_one_topic_level_is_unroutable() {
        for id in ["a/b", "+", "h#1"] {
            let f = fields(json!({ "id": id }));
            let err = resolve(TopicLayout::KindDevice, "helm/data", &f).unwrap_err();
            assert_eq!(err, IngestError::UnroutableMessage("helm/data".into()));
        }
    }

    #[test]
    fn kind_falls_back_to_payload_then_data() {
        let typed = fields(json!({"type": "IMAGE"}));
        let route = resolve(TopicLayout::DeviceKind, "helm/h-01", &typed).unwrap();
        assert_eq!(route.kind, Some(MessageKind::Image));

        let untyped = resolve(TopicLayout::DeviceKind, "helm/h-01", &Fields::new()).unwrap();
        assert_eq!(untyped.kind, Some(MessageKind::Data));
    }

    #[test]
    fn unknown_kind_is_reported_as_none() {
        let route = resolve(TopicLayout::DeviceKind, "helm/h-01/battery", &Fields::new()).unwrap();
        assert_eq!(route.kind, None);
    }

    #[test]
    fn layout_deserializes_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            layout: TopicLayout,
        }
        let w: Wrapper = toml::from_str("layout = \"kind_device\"").unwrap();
        assert_eq!(w.layout, TopicLayout::KindDevice);
    }
}
