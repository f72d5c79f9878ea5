use crate::sequencer::InteractionKind;

/// Counter file holding the last-used session number, one line.
pub const COUNTER_FILE: &str = ".last_session";

pub const VALIDATION_JSON_FILE: &str = "validation.json";
pub const VALIDATION_MARKDOWN_FILE: &str = "validation.md";

#[must_use]
pub fn session_dir_name(number: u32) -> String {
    format!("session_{number:03}")
}

#[must_use]
pub fn interaction_dir_name(number: u32, kind: InteractionKind) -> String {
    format!("{number:03}-{}", kind.as_str())
}

#[must_use]
pub fn request_file_name(number: u32) -> String {
    format!("{number:03}-request.json")
}

/// Response files carry the number after their request's number.
#[must_use]
pub fn response_file_name(request_number: u32) -> String {
    format!("{:03}-response.json", request_number + 1)
}
