//! Static JSON schema builders for tool inputs.
//!
//! Schemas are plain data validated at the boundary; the dispatch table never
//! consults them at call time.

use serde_json::{Map, Value, json};

/// Schema for tools that only take a `pdf_path`.
pub(crate) fn pdf_path_only_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("pdf_path".into(), string_schema("Path to the PDF on disk"));
    finalize_object_schema(properties, &["pdf_path"])
}

/// Schema for the `search_pdf` tool input.
pub(crate) fn search_pdf_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("pdf_path".into(), string_schema("Path to the PDF on disk"));
    properties.insert("needle".into(), string_schema("Text to search for"));

    let mut case_schema = Map::new();
    case_schema.insert("type".into(), Value::String("boolean".into()));
    case_schema.insert(
        "description".into(),
        Value::String("Match case exactly (defaults to false)".into()),
    );
    case_schema.insert("default".into(), Value::Bool(false));
    properties.insert("case_sensitive".into(), Value::Object(case_schema));

    finalize_object_schema(properties, &["pdf_path", "needle"])
}

/// Schema for the `answer_question` tool input.
pub(crate) fn answer_question_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("pdf_path".into(), string_schema("Path to the PDF on disk"));
    properties.insert(
        "question".into(),
        string_schema("Natural-language question to answer from the document"),
    );
    finalize_object_schema(properties, &["pdf_path", "question"])
}

/// Schema for the `answer_question_rag` tool input.
pub(crate) fn answer_question_rag_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("pdf_path".into(), string_schema("Path to the PDF on disk"));
    properties.insert(
        "question".into(),
        string_schema("Natural-language question to answer from the document"),
    );
    properties.insert("top_k".into(), top_k_schema());

    let mut schema = finalize_object_schema(properties, &["pdf_path", "question"]);
    if let Value::Object(map) = &mut schema {
        map.insert(
            "examples".into(),
            json!([{ "pdf_path": "workdir/uploads/report.pdf", "question": "What was revenue in 2024?", "top_k": 3 }]),
        );
    }
    schema
}

/// Schema for the `answer_multiple_questions_rag` tool input.
pub(crate) fn answer_multiple_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("pdf_path".into(), string_schema("Path to the PDF on disk"));

    let mut item_schema = Map::new();
    item_schema.insert("type".into(), Value::String("string".into()));
    let mut questions_schema = Map::new();
    questions_schema.insert("type".into(), Value::String("array".into()));
    questions_schema.insert(
        "description".into(),
        Value::String("Questions answered in order; one result entry each".into()),
    );
    questions_schema.insert("items".into(), Value::Object(item_schema));
    questions_schema.insert("minItems".into(), Value::Number(1.into()));
    properties.insert("questions".into(), Value::Object(questions_schema));
    properties.insert("top_k".into(), top_k_schema());

    finalize_object_schema(properties, &["pdf_path", "questions"])
}

/// Schema for the `summarize_document` tool input.
pub(crate) fn summarize_schema() -> Value {
    let mut properties = Map::new();
    properties.insert("pdf_path".into(), string_schema("Path to the PDF on disk"));

    let mut max_length_schema = Map::new();
    max_length_schema.insert("type".into(), Value::String("integer".into()));
    max_length_schema.insert(
        "description".into(),
        Value::String("Word budget for the summary (must be > 0)".into()),
    );
    max_length_schema.insert("minimum".into(), Value::Number(1.into()));
    properties.insert("max_length".into(), Value::Object(max_length_schema));

    finalize_object_schema(properties, &["pdf_path"])
}

fn top_k_schema() -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("integer".into()));
    schema.insert(
        "description".into(),
        Value::String("Number of chunks to retrieve (defaults to TOP_K)".into()),
    );
    schema.insert("minimum".into(), Value::Number(1.into()));
    Value::Object(schema)
}

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_are_declared() {
        let schema = answer_question_rag_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required array")
            .iter()
            .map(|value| value.as_str().expect("string"))
            .collect();
        assert_eq!(required, ["pdf_path", "question"]);
        assert_eq!(schema["properties"]["top_k"]["minimum"], 1);
    }

    #[test]
    fn schemas_reject_additional_properties() {
        for schema in [
            pdf_path_only_schema(),
            search_pdf_schema(),
            answer_multiple_schema(),
            summarize_schema(),
        ] {
            assert_eq!(schema["additionalProperties"], false);
            assert_eq!(schema["type"], "object");
        }
    }
}
