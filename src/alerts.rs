//! Alert sets assembled from extension results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extensions::ExtensionId;
use crate::render::Renderer;

/// One alert produced by an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Extension that produced the alert.
    pub extension: ExtensionId,

    /// Key of the alert when the extension returned a keyed map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Alert fields as returned by the extension (`title`, `comment`, ...).
    pub content: Map<String, Value>,
}

/// All alerts of one reload cycle, in extension order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSet {
    pub alerts: Vec<Alert>,
}

impl AlertSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Append the alerts carried by one extension's result.
    pub fn extend_from_result(&mut self, extension: &str, value: &Value) {
        collect(extension, value, None, &mut self.alerts);
    }

    /// Render every string `comment` field to preview markup.
    pub fn render_comments(&mut self, renderer: &dyn Renderer) {
        for alert in &mut self.alerts {
            if let Some(Value::String(comment)) = alert.content.get_mut("comment") {
                *comment = renderer.render(comment);
            }
        }
    }
}

fn collect(extension: &str, value: &Value, id: Option<String>, out: &mut Vec<Alert>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_alert(extension, item, None, out);
            }
        }
        Value::Object(fields) => {
            if let Some(alerts) = fields.get("alerts") {
                collect(extension, alerts, id, out);
                return;
            }
            for (key, item) in fields {
                if key == "db" {
                    continue;
                }
                push_alert(extension, item, Some(key.clone()), out);
            }
        }
        other => push_alert(extension, other, id, out),
    }
}

fn push_alert(extension: &str, value: &Value, id: Option<String>, out: &mut Vec<Alert>) {
    let content = match value {
        Value::Null => return,
        Value::Object(fields) => fields.clone(),
        Value::String(title) => single("title", Value::String(title.clone())),
        other => single("title", Value::String(other.to_string())),
    };

    out.push(Alert {
        extension: extension.to_string(),
        id,
        content,
    });
}

fn single(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MarkdownRenderer;
    use serde_json::json;

    fn alerts_of(value: Value) -> AlertSet {
        let mut set = AlertSet::new();
        set.extend_from_result("ext", &value);
        set
    }

    #[test]
    fn test_null_and_empty_results() {
        assert!(alerts_of(json!(null)).is_empty());
        assert!(alerts_of(json!({ "alerts": [] })).is_empty());
        assert!(alerts_of(json!({ "db": { "x": 1 } })).is_empty());
    }

    #[test]
    fn test_string_result_is_one_titled_alert() {
        let set = alerts_of(json!("Hot day"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.alerts[0].content["title"], "Hot day");
        assert_eq!(set.alerts[0].id, None);
    }

    #[test]
    fn test_array_result() {
        let set = alerts_of(json!(["a", null, { "title": "b", "comment": "c" }]));
        assert_eq!(set.len(), 2);
        assert_eq!(set.alerts[1].content["comment"], "c");
    }

    #[test]
    fn test_keyed_alerts_and_db_side_channel() {
        let set = alerts_of(json!({
            "alerts": { "x1": { "title": "first" }, "x2": "second" },
            "db": { "seen": ["x1"] }
        }));
        assert_eq!(set.len(), 2);
        assert_eq!(set.alerts[0].id.as_deref(), Some("x1"));
        assert_eq!(set.alerts[1].content["title"], "second");
    }

    #[test]
    fn test_order_follows_extensions() {
        let mut set = AlertSet::new();
        set.extend_from_result("first", &json!(["1"]));
        set.extend_from_result("second", &json!(["2"]));
        set.extend_from_result("third", &json!("3"));

        let order: Vec<_> = set.alerts.iter().map(|a| a.extension.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_render_comments() {
        let mut set = alerts_of(json!([{ "title": "t", "comment": "   **bold**" }, "plain"]));
        set.render_comments(&MarkdownRenderer);

        assert_eq!(
            set.alerts[0].content["comment"].as_str().unwrap().trim(),
            "<p><strong>bold</strong></p>"
        );
        assert!(set.alerts[1].content.get("comment").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let set = alerts_of(json!({ "alerts": { "k": "v" } }));
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!({ "alerts": [{ "extension": "ext", "id": "k", "content": { "title": "v" } }] })
        );
    }
}
