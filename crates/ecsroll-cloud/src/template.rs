//! Rendering of [`StackDescriptor`]s into CloudFormation templates.

use ecsroll_stack::StackDescriptor;
use serde_json::{Map, Value, json};

const FORMAT_VERSION: &str = "2010-09-09";

pub fn render(stack: &StackDescriptor) -> Value {
    let mut resources = Map::new();
    for resource in &stack.resources {
        let mut body = Map::new();
        body.insert("Type".to_owned(), json!(resource.kind.type_name()));
        if !is_empty_object(&resource.properties) {
            body.insert("Properties".to_owned(), resource.properties.clone());
        }
        if !resource.depends_on.is_empty() {
            body.insert("DependsOn".to_owned(), json!(resource.depends_on));
        }
        resources.insert(resource.logical_id.clone(), Value::Object(body));
    }

    let mut outputs = Map::new();
    for output in &stack.outputs {
        outputs.insert(output.key.clone(), json!({ "Value": output.value }));
    }

    let mut template = Map::new();
    template.insert("AWSTemplateFormatVersion".to_owned(), json!(FORMAT_VERSION));
    template.insert("Description".to_owned(), json!(stack.description));
    template.insert("Resources".to_owned(), Value::Object(resources));
    if !outputs.is_empty() {
        template.insert("Outputs".to_owned(), Value::Object(outputs));
    }
    Value::Object(template)
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty) || value.is_null()
}
