use super::*;
use serde_json::json;

fn petstore() -> Value {
    json!({
        "openapi": "3.0.0",
        "paths": {
            "/pets": {
                "parameters": [
                    {"name": "verbose", "in": "query", "schema": {"type": "boolean"}}
                ],
                "get": {
                    "operationId": "listPets",
                    "summary": "List all pets",
                    "tags": ["pets"],
                    "parameters": [
                        {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                    ]
                },
                "post": {
                    "operationId": "createPet",
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "age": {"type": "integer"}
                            },
                            "required": ["name"]
                        }}}
                    }
                }
            },
            "/pets/{petId}": {
                "get": {
                    "operationId": "getPetById",
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}
                    ]
                }
            }
        }
    })
}

fn find<'a>(tools: &'a [ToolMeta], name: &str) -> &'a ToolMeta {
    tools
        .iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("no tool named {}", name))
}

#[test]
fn synthesises_one_tool_per_operation() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    assert_eq!(tools.len(), 3);
}

#[test]
fn tool_ids_encode_method_and_path() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    let get = find(&tools, "list-pets");
    assert_eq!(get.id, "GET::pets");
    let by_id = find(&tools, "get-pet-by-id");
    assert_eq!(by_id.id, "GET::pets__---petId");
    assert_eq!(by_id.original_path, "/pets/{petId}");
}

#[test]
fn path_level_parameters_inherited() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    let get = find(&tools, "list-pets");
    let props = get.input_schema["properties"].as_object().unwrap();
    assert!(props.contains_key("verbose"));
    assert!(props.contains_key("limit"));
}

#[test]
fn operation_parameters_override_by_name_and_location() {
    let doc = json!({
        "paths": {"/x": {
            "parameters": [{"name": "q", "in": "query", "schema": {"type": "string"}}],
            "get": {
                "operationId": "getX",
                "parameters": [{"name": "q", "in": "query", "required": true, "schema": {"type": "integer"}}]
            }
        }}
    });
    let tools = synthesize_tools(&doc, &SynthOptions::default()).unwrap();
    let tool = &tools[0];
    assert_eq!(tool.input_schema["properties"]["q"]["type"], "integer");
    assert_eq!(tool.params.len(), 1);
    assert!(tool.params[0].required);
}

#[test]
fn properties_carry_location_metadata() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    let by_id = find(&tools, "get-pet-by-id");
    assert_eq!(
        by_id.input_schema["properties"]["petId"]["x-parameter-location"],
        "path"
    );
    let create = find(&tools, "create-pet");
    assert_eq!(
        create.input_schema["properties"]["name"]["x-parameter-location"],
        "body"
    );
}

#[test]
fn object_body_merges_properties() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    let create = find(&tools, "create-pet");
    let props = create.input_schema["properties"].as_object().unwrap();
    assert!(props.contains_key("name"));
    assert!(props.contains_key("age"));
    // Required propagates from the body schema
    let required = create.input_schema["required"].as_array().unwrap();
    assert!(required.contains(&json!("name")));
    assert!(!required.contains(&json!("age")));
    // No synthetic `body` param for object bodies
    assert!(create.params.iter().all(|p| p.location != ParamLocation::Body));
    assert_eq!(create.body_fields.get("name"), Some(&"name".to_string()));
}

#[test]
fn body_property_colliding_with_parameter_gets_prefixed() {
    let doc = json!({
        "paths": {"/items/{id}": {"post": {
            "operationId": "updateItem",
            "parameters": [
                {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}
            ],
            "requestBody": {
                "required": true,
                "content": {"application/json": {"schema": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "value": {"type": "string"}},
                    "required": ["value"]
                }}}
            }
        }}}
    });
    let tools = synthesize_tools(&doc, &SynthOptions::default()).unwrap();
    let tool = &tools[0];
    let props = tool.input_schema["properties"].as_object().unwrap();
    assert!(props.contains_key("id"));
    assert!(props.contains_key("body_id"));
    assert!(props.contains_key("value"));
    // body_id maps back to the body field 'id'
    assert_eq!(tool.body_fields.get("body_id"), Some(&"id".to_string()));
    assert_eq!(tool.body_fields.get("value"), Some(&"value".to_string()));
}

#[test]
fn primitive_body_becomes_body_property() {
    let doc = json!({
        "paths": {"/upload": {"post": {
            "operationId": "uploadText",
            "requestBody": {
                "required": true,
                "content": {"text/plain": {"schema": {"type": "string"}}}
            }
        }}}
    });
    let tools = synthesize_tools(&doc, &SynthOptions::default()).unwrap();
    let tool = &tools[0];
    assert_eq!(tool.input_schema["properties"]["body"]["type"], "string");
    assert_eq!(tool.input_schema["required"], json!(["body"]));
    let body_params: Vec<_> = tool
        .params
        .iter()
        .filter(|p| p.location == ParamLocation::Body)
        .collect();
    assert_eq!(body_params.len(), 1);
    assert!(body_params[0].required);
}

#[test]
fn missing_operation_id_falls_back_to_method_path() {
    let doc = json!({"paths": {"/status": {"get": {}}}});
    let tools = synthesize_tools(&doc, &SynthOptions::default()).unwrap();
    assert_eq!(tools[0].name, "get-status");
    assert_eq!(tools[0].description, "GET /status");
}

#[test]
fn duplicate_names_get_numeric_suffix() {
    let doc = json!({
        "paths": {
            "/a": {"get": {"operationId": "sameName"}},
            "/b": {"get": {"operationId": "sameName"}},
            "/c": {"get": {"operationId": "sameName"}}
        }
    });
    let tools = synthesize_tools(&doc, &SynthOptions::default()).unwrap();
    let mut names: Vec<_> = tools.iter().map(|t| t.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["same-name", "same-name-2", "same-name-3"]);
}

#[test]
fn names_always_valid() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    for tool in &tools {
        assert!(tool.name.len() <= 64);
        assert!(
            tool.name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        );
    }
}

#[test]
fn tags_and_resource_recorded() {
    let tools = synthesize_tools(&petstore(), &SynthOptions::default()).unwrap();
    let get = find(&tools, "list-pets");
    assert_eq!(get.tag.as_deref(), Some("pets"));
    assert_eq!(get.resource_name, "pets");
}

#[test]
fn double_colon_path_is_fatal() {
    let doc = json!({"paths": {"/x::y": {"get": {}}}});
    assert!(synthesize_tools(&doc, &SynthOptions::default()).is_err());
}

#[test]
fn disable_abbreviation_errors_on_overlong_name() {
    let doc = json!({"paths": {"/x": {"get": {
        "operationId": "thisOperationIdIsFarTooLongToSurviveWithoutAnyAbbreviationAppliedAtAll"
    }}}});
    let opts = SynthOptions {
        disable_abbreviation: true,
    };
    assert!(synthesize_tools(&doc, &opts).is_err());
}

mod filtering {
    use super::*;

    fn tools() -> Vec<ToolMeta> {
        synthesize_tools(&petstore(), &SynthOptions::default()).unwrap()
    }

    #[test]
    fn all_mode_empty_filter_keeps_everything() {
        let kept = apply_filter(tools(), ToolsMode::All, &ToolFilter::default());
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn include_operations_filters_by_method() {
        let filter = ToolFilter {
            include_operations: vec!["get".into()],
            ..Default::default()
        };
        let kept = apply_filter(tools(), ToolsMode::All, &filter);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|t| t.http_method == "GET"));
    }

    #[test]
    fn include_resources_matches_path_prefix() {
        let filter = ToolFilter {
            include_resources: vec!["pets".into()],
            ..Default::default()
        };
        let kept = apply_filter(tools(), ToolsMode::All, &filter);
        assert_eq!(kept.len(), 3);

        let filter = ToolFilter {
            include_resources: vec!["orders".into()],
            ..Default::default()
        };
        assert!(apply_filter(tools(), ToolsMode::All, &filter).is_empty());
    }

    #[test]
    fn include_tags_filters() {
        let filter = ToolFilter {
            include_tags: vec!["pets".into()],
            ..Default::default()
        };
        let kept = apply_filter(tools(), ToolsMode::All, &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "list-pets");
    }

    #[test]
    fn include_tools_overrides_other_filters() {
        // create-pet fails the GET filter but is named explicitly
        let filter = ToolFilter {
            include_tools: vec!["create-pet".into()],
            include_operations: vec!["get".into()],
            ..Default::default()
        };
        let kept = apply_filter(tools(), ToolsMode::All, &filter);
        let names: Vec<_> = kept.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"create-pet"));
        assert!(names.contains(&"list-pets"));
    }

    #[test]
    fn explicit_mode_with_empty_list_is_empty() {
        let filter = ToolFilter {
            include_operations: vec!["get".into()],
            include_tags: vec!["pets".into()],
            ..Default::default()
        };
        assert!(apply_filter(tools(), ToolsMode::Explicit, &filter).is_empty());
    }

    #[test]
    fn explicit_mode_matches_by_id_or_name() {
        let filter = ToolFilter {
            include_tools: vec!["GET::pets".into(), "create-pet".into()],
            ..Default::default()
        };
        let kept = apply_filter(tools(), ToolsMode::Explicit, &filter);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn dynamic_mode_keeps_catalog_intact() {
        let filter = ToolFilter {
            include_operations: vec!["get".into()],
            ..Default::default()
        };
        assert_eq!(apply_filter(tools(), ToolsMode::Dynamic, &filter).len(), 3);
    }
}
