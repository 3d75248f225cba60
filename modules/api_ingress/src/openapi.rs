use std::collections::BTreeMap;

use modkit::api::{OperationSpec, ParamLocation, ResponseSpec};
use serde_json::{json, Map, Value};

use crate::model::ComponentsRegistry;

pub const TOKEN_SCHEME: &str = "tokenAuth";

#[derive(serde::Serialize)]
pub struct OpenApi {
    pub openapi: &'static str,
    pub info: OpenApiInfo,
    pub paths: Value,
    pub components: OpenApiComponents,
    /// Applied to every operation.
    pub security: Vec<BTreeMap<&'static str, Vec<String>>>,
}

#[derive(serde::Serialize)]
pub struct OpenApiInfo {
    pub title: &'static str,
    pub version: String,
    pub description: Option<&'static str>,
}

#[derive(serde::Serialize, Default)]
pub struct OpenApiComponents {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, Value>,
    #[serde(rename = "securitySchemes")]
    pub security_schemes: BTreeMap<&'static str, Value>,
}

impl OpenApiComponents {
    pub fn from_registry(registry: &ComponentsRegistry) -> anyhow::Result<Self> {
        let mut schemas = BTreeMap::new();
        for (name, schema) in &registry.schemas {
            schemas.insert(name.clone(), serde_json::to_value(schema)?);
        }

        let mut security_schemes = BTreeMap::new();
        security_schemes.insert(
            TOKEN_SCHEME,
            json!({ "type": "apiKey", "in": "header", "name": "Authorization" }),
        );

        Ok(Self {
            schemas,
            security_schemes,
        })
    }
}

/// `$ref` when the component is known, otherwise a minimal inline schema.
fn make_schema(components: &ComponentsRegistry, content_type: &str, schema_name: Option<&str>) -> Value {
    if let Some(name) = schema_name {
        if components.has_schema(name) {
            return json!({ "$ref": format!("#/components/schemas/{name}") });
        }
    }
    match content_type {
        "application/json" => json!({ "type": "object" }),
        _ => json!({}),
    }
}

fn make_content_obj(
    components: &ComponentsRegistry,
    content_type: &str,
    schema_name: Option<&str>,
    is_array: bool,
) -> Value {
    let mut schema = make_schema(components, content_type, schema_name);
    if is_array {
        schema = json!({ "type": "array", "items": schema });
    }
    let mut content = Map::new();
    content.insert(content_type.to_string(), json!({ "schema": schema }));
    Value::Object(content)
}

fn response_obj(components: &ComponentsRegistry, r: &ResponseSpec) -> Value {
    let mut obj = Map::new();
    obj.insert("description".into(), Value::String(r.description.clone()));
    // Empty content type: no body (e.g. 204).
    if !r.content_type.is_empty() {
        obj.insert(
            "content".into(),
            make_content_obj(components, r.content_type, r.schema_name.as_deref(), r.is_array),
        );
    }
    Value::Object(obj)
}

fn operation_obj(components: &ComponentsRegistry, spec: &OperationSpec) -> Value {
    let mut operation = Map::new();

    let op_id = spec
        .operation_id
        .clone()
        .unwrap_or_else(|| spec.handler_id.clone());
    operation.insert("operationId".into(), Value::String(op_id));

    if let Some(summary) = &spec.summary {
        operation.insert("summary".into(), Value::String(summary.clone()));
    }
    if let Some(description) = &spec.description {
        operation.insert("description".into(), Value::String(description.clone()));
    }
    if !spec.tags.is_empty() {
        operation.insert("tags".into(), json!(spec.tags));
    }

    if let Some(req) = &spec.request_body {
        let mut rb = Map::new();
        if let Some(desc) = &req.description {
            rb.insert("description".into(), Value::String(desc.clone()));
        }
        rb.insert("required".into(), Value::Bool(req.required));
        rb.insert(
            "content".into(),
            make_content_obj(components, req.content_type, req.schema_name.as_deref(), false),
        );
        operation.insert("requestBody".into(), Value::Object(rb));
    }

    let mut responses = Map::new();
    for r in &spec.responses {
        responses.insert(r.status.to_string(), response_obj(components, r));
    }
    operation.insert("responses".into(), Value::Object(responses));

    if !spec.params.is_empty() {
        let parameters: Vec<Value> = spec
            .params
            .iter()
            .map(|p| {
                let location = match p.location {
                    ParamLocation::Path => "path",
                    ParamLocation::Query => "query",
                    ParamLocation::Header => "header",
                };
                let mut schema = json!({ "type": p.param_type });
                if let Some(format) = &p.format {
                    schema["format"] = Value::String(format.clone());
                }
                let mut param = json!({
                    "name": p.name,
                    "in": location,
                    // OpenAPI requires all path params to be required.
                    "required": p.location == ParamLocation::Path || p.required,
                    "schema": schema,
                });
                if let Some(description) = &p.description {
                    param["description"] = Value::String(description.clone());
                }
                param
            })
            .collect();
        operation.insert("parameters".into(), Value::Array(parameters));
    }

    Value::Object(operation)
}

/// Assemble the document from operation specs and registered components.
pub fn build_document<'a>(
    specs: impl IntoIterator<Item = &'a OperationSpec>,
    components: &ComponentsRegistry,
) -> anyhow::Result<OpenApi> {
    let mut paths_map: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
    for spec in specs {
        paths_map
            .entry(spec.path.clone())
            .or_default()
            .insert(spec.method.as_str().to_lowercase(), operation_obj(components, spec));
    }

    let mut requirement = BTreeMap::new();
    requirement.insert(TOKEN_SCHEME, Vec::new());

    Ok(OpenApi {
        openapi: "3.0.3",
        info: OpenApiInfo {
            title: "Users API",
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("Token-gated CRUD API for user records"),
        },
        paths: serde_json::to_value(paths_map)?,
        components: OpenApiComponents::from_registry(components)?,
        security: vec![requirement],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use modkit::api::{ParamSpec, RequestBodySpec};

    fn spec() -> OperationSpec {
        OperationSpec {
            method: axum::http::Method::DELETE,
            path: "/users/{id}".into(),
            operation_id: Some("users.delete".into()),
            summary: None,
            description: None,
            tags: vec!["users".into()],
            params: vec![ParamSpec {
                name: "id".into(),
                location: ParamLocation::Path,
                required: true,
                description: None,
                param_type: "string".into(),
                format: Some("uuid".into()),
            }],
            request_body: Some(RequestBodySpec {
                content_type: "application/json",
                description: None,
                schema_name: Some("Missing".into()),
                required: false,
            }),
            responses: vec![ResponseSpec {
                status: 204,
                content_type: "",
                description: "Deleted".into(),
                schema_name: None,
                is_array: false,
            }],
            handler_id: "delete:_users__id_".into(),
        }
    }

    #[test]
    fn document_has_global_token_security() {
        let doc = build_document([&spec()], &ComponentsRegistry::default()).unwrap();
        let v = serde_json::to_value(&doc).unwrap();

        assert_eq!(v["security"][0]["tokenAuth"], json!([]));
        let scheme = &v["components"]["securitySchemes"]["tokenAuth"];
        assert_eq!(scheme["type"], "apiKey");
        assert_eq!(scheme["in"], "header");
        assert_eq!(scheme["name"], "Authorization");

        let op = &v["paths"]["/users/{id}"]["delete"];
        assert_eq!(op["operationId"], "users.delete");
        assert_eq!(op["parameters"][0]["schema"]["format"], "uuid");
        assert!(op["responses"]["204"].get("content").is_none());
        // unknown component falls back to an inline object schema
        assert_eq!(
            op["requestBody"]["content"]["application/json"]["schema"]["type"],
            "object"
        );
    }
}
