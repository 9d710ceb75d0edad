//! Static tool catalog.
//!
//! Every tool is a [`ToolDefinition`] value: schema, GraphQL document,
//! result dot-path and a pure argument-shaping function. The registry is
//! built once at startup and only read afterwards.

pub mod manager;
pub mod partner;
pub mod shaping;

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use crate::auth::EndpointKind;
pub use shaping::{ShapeError, extract_path};

/// Turns flat tool arguments into GraphQL variables.
pub type ShapeFn = fn(&Map<String, Value>) -> Result<Value, ShapeError>;

/// A callable tool backed by one GraphQL document.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub endpoint: EndpointKind,
    /// JSON Schema of the `arguments` object.
    pub input_schema: Value,
    pub document: &'static str,
    /// Dot-path into the GraphQL `data` object.
    pub result_path: &'static str,
    pub shape: ShapeFn,
}

impl ToolDefinition {
    /// Entry for a `tools/list` result.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
            "annotations": { "category": self.category },
        })
    }

    pub fn shape_arguments(&self, arguments: &Map<String, Value>) -> Result<Value, ShapeError> {
        (self.shape)(arguments)
    }

    pub fn extract_result(&self, data: &Value) -> Value {
        extract_path(data, self.result_path)
    }
}

/// Name → tool lookup, preserving catalog order for listings.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDefinition>) -> Self {
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();
        Self { tools, by_name }
    }

    /// The full partner + manager catalog.
    pub fn builtin() -> Self {
        let mut tools = partner::tools();
        tools.extend(manager::tools());
        Self::new(tools)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Look up a tool that belongs to `endpoint`.
    pub fn get_for(&self, endpoint: EndpointKind, name: &str) -> Option<&ToolDefinition> {
        self.get(name).filter(|t| t.endpoint == endpoint)
    }

    pub fn for_endpoint(&self, endpoint: EndpointKind) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().filter(move |t| t.endpoint == endpoint)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_catalog() {
        let registry = ToolRegistry::builtin();
        let partner: Vec<_> = registry
            .for_endpoint(EndpointKind::Partner)
            .map(|t| t.name)
            .collect();
        let manager: Vec<_> = registry
            .for_endpoint(EndpointKind::Manager)
            .map(|t| t.name)
            .collect();

        assert_eq!(
            partner,
            vec![
                "list_customers",
                "get_customer",
                "create_customer",
                "update_customer",
                "list_orders",
                "get_order",
                "list_locations"
            ]
        );
        assert_eq!(
            manager,
            vec![
                "list_partners",
                "get_partner",
                "update_partner_status",
                "list_users",
                "create_user"
            ]
        );
    }

    #[test]
    fn test_names_unique() {
        let registry = ToolRegistry::builtin();
        let names: HashSet<_> = registry.tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), registry.len());
    }

    #[test]
    fn test_get_for_respects_endpoint() {
        let registry = ToolRegistry::builtin();
        assert!(registry.get_for(EndpointKind::Partner, "list_customers").is_some());
        assert!(registry.get_for(EndpointKind::Manager, "list_customers").is_none());
        assert!(registry.get("no_such_tool").is_none());
    }

    #[test]
    fn test_listing_shape() {
        let registry = ToolRegistry::builtin();
        let listing = registry.get("get_order").unwrap().to_listing();
        assert_eq!(listing["name"], "get_order");
        assert_eq!(listing["annotations"]["category"], "orders");
        assert_eq!(listing["inputSchema"]["type"], "object");
        assert_eq!(listing["inputSchema"]["required"], json!(["id"]));
    }

    #[test]
    fn test_every_schema_lists_its_required_fields() {
        let registry = ToolRegistry::builtin();
        for tool in registry.tools.iter() {
            let props = tool.input_schema["properties"].as_object().unwrap();
            for req in tool.input_schema["required"].as_array().unwrap() {
                assert!(
                    props.contains_key(req.as_str().unwrap()),
                    "{} requires undeclared {}",
                    tool.name,
                    req
                );
            }
            assert!(!tool.document.is_empty());
        }
    }
}
