//! Request mapping templates for data-store integrations

use crate::integrations::CrudAction;
use apigw_forge_common::{ForgeError, Result};
use tera::{Context, Tera};

/// Values substituted into a mapping template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingContext {
    pub table_name: String,
    pub key_attribute: String,
    /// VTL expression yielding the item key at request time
    pub key_expression: String,
    /// Page size of list requests
    pub limit: Option<u32>,
}

impl MappingContext {
    fn to_tera(&self) -> Context {
        let mut context = Context::new();
        context.insert("table_name", &self.table_name);
        context.insert("key_attribute", &self.key_attribute);
        context.insert("key_expression", &self.key_expression);
        context.insert("limit", &self.limit);
        context
    }
}

/// Load all templates
pub fn load_templates() -> Result<Tera> {
    let mut tera = Tera::default();

    tera.add_raw_template("put_item.vtl", include_str!("../templates/put_item.vtl.tera"))
        .map_err(|e| ForgeError::Template(format!("Failed to load put_item template: {}", e)))?;

    tera.add_raw_template("get_item.vtl", include_str!("../templates/get_item.vtl.tera"))
        .map_err(|e| ForgeError::Template(format!("Failed to load get_item template: {}", e)))?;

    tera.add_raw_template(
        "update_item.vtl",
        include_str!("../templates/update_item.vtl.tera"),
    )
    .map_err(|e| ForgeError::Template(format!("Failed to load update_item template: {}", e)))?;

    tera.add_raw_template(
        "delete_item.vtl",
        include_str!("../templates/delete_item.vtl.tera"),
    )
    .map_err(|e| ForgeError::Template(format!("Failed to load delete_item template: {}", e)))?;

    tera.add_raw_template("scan.vtl", include_str!("../templates/scan.vtl.tera"))
        .map_err(|e| ForgeError::Template(format!("Failed to load scan template: {}", e)))?;

    Ok(tera)
}

fn template_name(action: CrudAction) -> &'static str {
    match action {
        CrudAction::Create => "put_item.vtl",
        CrudAction::Read => "get_item.vtl",
        CrudAction::Update => "update_item.vtl",
        CrudAction::Delete => "delete_item.vtl",
        CrudAction::List => "scan.vtl",
    }
}

/// Render the request template for `action`
pub fn render_request_template(action: CrudAction, context: &MappingContext) -> Result<String> {
    let tera = load_templates()?;
    let name = template_name(action);

    tera.render(name, &context.to_tera())
        .map_err(|e| ForgeError::Template(format!("Failed to render {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> MappingContext {
        MappingContext {
            table_name: "job_details".to_string(),
            key_attribute: "id".to_string(),
            key_expression: "$input.params('jobId')".to_string(),
            limit: None,
        }
    }

    #[test]
    fn test_all_templates_load() {
        let tera = load_templates().unwrap();
        for action in CrudAction::ALL {
            assert!(tera.get_template_names().any(|n| n == template_name(*action)));
        }
    }

    #[test]
    fn test_get_item_renders_valid_json() {
        let rendered = render_request_template(CrudAction::Read, &context()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["TableName"], "job_details");
        assert_eq!(value["Key"]["id"]["S"], "$input.params('jobId')");
    }

    #[test]
    fn test_body_templates_keep_vtl_expressions() {
        for action in [CrudAction::Create, CrudAction::Update] {
            let rendered = render_request_template(action, &context()).unwrap();
            assert!(rendered.contains("\"TableName\": \"job_details\""));
            // escapeJavaScript turns ' into \', which is not valid JSON
            assert!(rendered
                .contains(r#""$util.escapeJavaScript($input.body).replaceAll("\\'","'")""#));
        }
    }

    #[test]
    fn test_scan_limit_is_optional() {
        let rendered = render_request_template(CrudAction::List, &context()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(value.get("Limit").is_none());

        let limited = MappingContext {
            limit: Some(50),
            ..context()
        };
        let rendered = render_request_template(CrudAction::List, &limited).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["Limit"], 50);
    }
}
