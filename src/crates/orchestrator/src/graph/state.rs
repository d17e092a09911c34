//! The typed shared state flowing through the generation graph
//!
//! The graph runtime moves state around as a JSON map; [`GraphState`] is the
//! typed view the node bodies work with. Conversions are lossless for known
//! keys; unknown keys are preserved by the runtime's map merging and simply
//! invisible here.

use serde::{Deserialize, Serialize};

/// Shared state of one generation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
    // Input
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub assets: Vec<serde_json::Value>,
    #[serde(default)]
    pub generate_now: bool,
    #[serde(default)]
    pub target_pages: Vec<String>,

    // Brief output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_doc: Option<serde_json::Value>,
    #[serde(default)]
    pub pages: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model: Option<serde_json::Value>,

    // Style output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_tokens: Option<serde_json::Value>,

    // Component registry output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_registry: Option<serde_json::Value>,

    // Generate output
    #[serde(default)]
    pub page_schemas: Vec<serde_json::Value>,

    // Aesthetic scorer
    #[serde(default)]
    pub aesthetic_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aesthetic_scores: Option<serde_json::Value>,

    // Refine loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,

    // Render output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_artifacts: Option<serde_json::Value>,
    #[serde(default)]
    pub build_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model_migration: Option<serde_json::Value>,

    // Runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub run_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_report: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,

    // Error handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GraphState {
    /// Parse the runtime state map into the typed view
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// The product type recorded on the product doc, when any
    pub fn product_type(&self) -> Option<&str> {
        let doc = self.product_doc.as_ref()?;
        doc.get("product_type")
            .or_else(|| doc.get("productType"))
            .and_then(|value| value.as_str())
    }
}
