use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::api::errors::ApiError;
use crate::services::errors::FieldErrors;

/// Runs `validator` rules and maps failures onto the `field -> [messages]` error map.
pub(crate) fn validate_payload(payload: &impl Validate) -> Result<(), ApiError> {
    payload.validate().map_err(|errors| {
        let mut fields = FieldErrors::new();
        collect(&errors, None, &mut fields);
        ApiError::Validation { message: "The given data was invalid".to_string(), fields }
    })
}

fn collect(errors: &ValidationErrors, prefix: Option<&str>, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = out.entry(path).or_default();
                for error in list {
                    let message = error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code));
                    messages.push(message);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, Some(&path), out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, Some(&format!("{path}.{index}")), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Item {
        #[validate(length(min = 1, message = "Label is required"))]
        label: String,
    }

    #[derive(Validate)]
    struct Payload {
        #[validate(length(min = 3, max = 10, message = "Name must be 3 to 10 characters"))]
        name: String,
        #[validate(range(min = 1))]
        count: i32,
        #[validate(nested)]
        items: Vec<Item>,
    }

    #[test]
    fn nested_failures_are_flattened_with_paths() {
        let payload = Payload {
            name: "ab".into(),
            count: 0,
            items: vec![Item { label: "ok".into() }, Item { label: String::new() }],
        };

        let Err(ApiError::Validation { fields, .. }) = validate_payload(&payload) else {
            panic!("expected validation error");
        };
        assert_eq!(fields["name"], vec!["Name must be 3 to 10 characters".to_string()]);
        assert!(fields["count"][0].contains("range"));
        assert_eq!(fields["items.1.label"], vec!["Label is required".to_string()]);
    }

    #[test]
    fn valid_payload_passes() {
        let payload = Payload { name: "abcd".into(), count: 2, items: Vec::new() };
        assert!(validate_payload(&payload).is_ok());
    }
}
