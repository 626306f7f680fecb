use serde_json::{Map, Value};

const GENERATED_TEXT: &str = "generated_text";

/// Shape of a parsed upstream response body.
///
/// Text-generation endpoints answer either with a list of generations or with
/// a single generation object; anything else (error objects, scalars) lands in
/// `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    Sequence(Vec<Value>),
    Mapping(Map<String, Value>),
    Other(Value),
}

impl From<Value> for UpstreamPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => UpstreamPayload::Sequence(items),
            Value::Object(map) => UpstreamPayload::Mapping(map),
            other => UpstreamPayload::Other(other),
        }
    }
}

impl UpstreamPayload {
    /// The generated text, if the payload carries one.
    ///
    /// For a sequence only the first element is consulted; an empty sequence
    /// has no generated text.
    pub fn generated_text(&self) -> Option<&str> {
        match self {
            UpstreamPayload::Sequence(items) => items
                .first()
                .and_then(Value::as_object)
                .and_then(generated_text_of),
            UpstreamPayload::Mapping(map) => generated_text_of(map),
            UpstreamPayload::Other(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamPayload::Sequence(_) => "sequence",
            UpstreamPayload::Mapping(_) => "mapping",
            UpstreamPayload::Other(_) => "other",
        }
    }
}

fn generated_text_of(map: &Map<String, Value>) -> Option<&str> {
    map.get(GENERATED_TEXT).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_generation_of_a_list_is_selected() {
        let payload = UpstreamPayload::from(json!([
            {"generated_text": "hello"},
            {"generated_text": "ignored"}
        ]));
        assert_eq!(payload.kind(), "sequence");
        assert_eq!(payload.generated_text(), Some("hello"));
    }

    #[test]
    fn single_generation_object_is_selected() {
        let payload = UpstreamPayload::from(json!({"generated_text": "hi"}));
        assert_eq!(payload.kind(), "mapping");
        assert_eq!(payload.generated_text(), Some("hi"));
    }

    #[test]
    fn empty_list_has_no_text() {
        let payload = UpstreamPayload::from(json!([]));
        assert_eq!(payload.generated_text(), None);
    }

    #[test]
    fn error_object_has_no_text() {
        let payload = UpstreamPayload::from(json!({"error": "model loading"}));
        assert_eq!(payload.generated_text(), None);
    }

    #[test]
    fn list_without_text_in_first_element_has_no_text() {
        let payload = UpstreamPayload::from(json!([
            {"score": 0.4},
            {"generated_text": "second"}
        ]));
        assert_eq!(payload.generated_text(), None);

        let payload = UpstreamPayload::from(json!(["generated_text"]));
        assert_eq!(payload.generated_text(), None);
    }

    #[test]
    fn non_string_text_is_ignored() {
        let payload = UpstreamPayload::from(json!({"generated_text": 42}));
        assert_eq!(payload.generated_text(), None);

        let payload = UpstreamPayload::from(json!([{"generated_text": null}]));
        assert_eq!(payload.generated_text(), None);
    }

    #[test]
    fn scalars_are_other() {
        for value in [json!("text"), json!(1), json!(null), json!(true)] {
            let payload = UpstreamPayload::from(value);
            assert_eq!(payload.kind(), "other");
            assert_eq!(payload.generated_text(), None);
        }
    }

    #[test]
    fn empty_string_is_still_a_generation() {
        let payload = UpstreamPayload::from(json!({"generated_text": ""}));
        assert_eq!(payload.generated_text(), Some(""));
    }
}
