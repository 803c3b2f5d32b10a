use crate::review::action::PendingAction;

const DELIMITER_WIDTH: usize = 50;
const MAX_VALUE_CHARS: usize = 100;
const TRUNCATED_VALUE_CHARS: usize = 97;

pub(crate) fn render_review(action: &PendingAction) -> String {
    let delimiter = "=".repeat(DELIMITER_WIDTH);
    let mut lines = vec![
        "📋 Pending Action Review".to_string(),
        delimiter.clone(),
        format!("ID: {}", action.id),
        format!("Type: {}", title_case(&action.category)),
        format!("Tool: {}", action.tool_name),
        String::new(),
        "Arguments:".to_string(),
    ];

    for (key, value) in &action.arguments {
        lines.push(format!("  • {key}: {}", truncate_value(&value.to_string())));
    }

    lines.push(String::new());
    lines.push(format!("Description: {}", action.description));
    lines.push(delimiter);

    lines.join("\n")
}

/// Uppercases the first letter of every alphabetic run and lowercases the rest.
pub fn title_case(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previous_alphabetic = false;

    for character in text.chars() {
        if character.is_alphabetic() {
            if previous_alphabetic {
                output.extend(character.to_lowercase());
            } else {
                output.extend(character.to_uppercase());
            }
            previous_alphabetic = true;
        } else {
            output.push(character);
            previous_alphabetic = false;
        }
    }

    output
}

pub fn truncate_value(value: &str) -> String {
    if value.chars().count() <= MAX_VALUE_CHARS {
        return value.to_string();
    }

    let mut truncated = value.chars().take(TRUNCATED_VALUE_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}
