//! Rendering the resource graph as a deployable template document.

use serde_json::{json, Map, Value};

use crate::error::{Result, StacksmithError};

use super::resource::ResourceGraph;

/// Template format version emitted in every rendered document.
const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Output formats for the rendered template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateFormat {
    /// JSON document.
    #[default]
    Json,
    /// YAML document.
    Yaml,
}

/// Renderer turning a [`ResourceGraph`] into a markup document.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    /// Description embedded in the template.
    description: Option<String>,
}

impl TemplateRenderer {
    /// Creates a new renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self { description: None }
    }

    /// Sets the template description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds the template document as a JSON value.
    #[must_use]
    pub fn to_value(&self, graph: &ResourceGraph) -> Value {
        let mut template = Map::new();
        template.insert(
            String::from("AWSTemplateFormatVersion"),
            Value::String(String::from(TEMPLATE_FORMAT_VERSION)),
        );
        if let Some(description) = &self.description {
            template.insert(
                String::from("Description"),
                Value::String(description.clone()),
            );
        }

        if !graph.parameters().is_empty() {
            let mut parameters = Map::new();
            for (name, binding) in graph.parameters() {
                let mut parameter = Map::new();
                parameter.insert(
                    String::from("Type"),
                    Value::String(binding.parameter_type.clone()),
                );
                if let Some(default) = &binding.default {
                    parameter.insert(String::from("Default"), Value::String(default.clone()));
                }
                parameters.insert(name.clone(), Value::Object(parameter));
            }
            template.insert(String::from("Parameters"), Value::Object(parameters));
        }

        let mut resources = Map::new();
        for resource in graph.iter() {
            let mut entry = Map::new();
            entry.insert(
                String::from("Type"),
                Value::String(String::from(resource.kind.as_type_str())),
            );
            let mut properties = resource.properties.clone();
            if resource.kind.is_taggable() && !graph.tags.is_empty() {
                stamp_tags(&mut properties, graph);
            }
            entry.insert(String::from("Properties"), properties);
            if !resource.depends_on.is_empty() {
                entry.insert(
                    String::from("DependsOn"),
                    json!(resource.depends_on.clone()),
                );
            }
            resources.insert(resource.logical_id.clone(), Value::Object(entry));
        }
        template.insert(String::from("Resources"), Value::Object(resources));

        if !graph.outputs().is_empty() {
            let mut outputs = Map::new();
            for (name, binding) in graph.outputs() {
                let mut output = Map::new();
                output.insert(String::from("Value"), binding.value.clone());
                if let Some(export) = &binding.export {
                    output.insert(String::from("Export"), json!({ "Name": export }));
                }
                outputs.insert(name.clone(), Value::Object(output));
            }
            template.insert(String::from("Outputs"), Value::Object(outputs));
        }

        Value::Object(template)
    }

    /// Renders the graph to a template string in the given format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self, graph: &ResourceGraph, format: TemplateFormat) -> Result<String> {
        let value = self.to_value(graph);
        match format {
            TemplateFormat::Json => serde_json::to_string_pretty(&value)
                .map_err(|e| StacksmithError::internal(format!("Template render failed: {e}"))),
            TemplateFormat::Yaml => serde_yaml::to_string(&value)
                .map_err(|e| StacksmithError::internal(format!("Template render failed: {e}"))),
        }
    }
}

/// Merges the graph tags into a resource's `Tags` property, keeping any
/// tag the resource already carries.
fn stamp_tags(properties: &mut Value, graph: &ResourceGraph) {
    let Some(object) = properties.as_object_mut() else {
        return;
    };
    let existing = object
        .get("Tags")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let existing_keys: Vec<&str> = existing
        .iter()
        .filter_map(|t| t.get("Key").and_then(Value::as_str))
        .collect();

    let mut tags = existing.clone();
    for (key, value) in &graph.tags {
        if !existing_keys.contains(&key.as_str()) {
            tags.push(json!({ "Key": key, "Value": value }));
        }
    }
    object.insert(String::from("Tags"), Value::Array(tags));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Resource, ResourceKind};

    #[test]
    fn test_render_shape() {
        let mut graph = ResourceGraph::new();
        graph.add(Resource::new(
            "WebTask",
            ResourceKind::TaskDefinition,
            json!({ "Family": "web" }),
        ));
        graph.add_output("WebTaskId", crate::graph::ref_to("WebTask"), None);

        let value = TemplateRenderer::new()
            .with_description("test stack")
            .to_value(&graph);

        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Description"], "test stack");
        assert_eq!(
            value["Resources"]["WebTask"]["Type"],
            "AWS::ECS::TaskDefinition"
        );
        assert_eq!(value["Outputs"]["WebTaskId"]["Value"]["Ref"], "WebTask");
    }

    #[test]
    fn test_tags_stamped_on_taggable_resources() {
        let mut graph = ResourceGraph::new();
        graph.tags.insert(String::from("team"), String::from("core"));
        graph.add(Resource::new(
            "WebSg",
            ResourceKind::SecurityGroup,
            json!({ "GroupDescription": "web" }),
        ));
        graph.add(Resource::new(
            "WebIngress",
            ResourceKind::SecurityGroupIngress,
            json!({ "FromPort": 80 }),
        ));

        let value = TemplateRenderer::new().to_value(&graph);
        let sg_tags = &value["Resources"]["WebSg"]["Properties"]["Tags"];
        assert_eq!(sg_tags[0]["Key"], "team");
        // Ingress rules are not taggable; no Tags property appears.
        assert!(value["Resources"]["WebIngress"]["Properties"]
            .get("Tags")
            .is_none());
    }

    #[test]
    fn test_render_json_roundtrips() {
        let graph = ResourceGraph::new();
        let body = TemplateRenderer::new()
            .render(&graph, TemplateFormat::Json)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(parsed["Resources"].is_object());
    }
}
