//! Classification of the firmware's prefix-coded command acknowledgements.
//!
//! Replies start with a short marker: `S0_` for success, `E0_` through `E3_`
//! for the failure categories. The message text after the marker is free-form
//! and occasionally load-bearing (`E1_` embeds the allowed range, `E3_` names
//! the state that was already in effect). The firmware is the oracle here;
//! the quirks below are preserved, not repaired.

/// Device-reported result of a write command. Non-success variants are
/// ordinary results, not errors; only [`CommandOutcome::UnrecognizedResponse`]
/// deserves a warning from callers.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Success,
    /// `E0_`: the station failed internally.
    InternalError,
    /// `E1_`: the requested value is outside the station's own limits.
    OutOfRange { min: f64, max: f64 },
    /// `E2_`: the station rejected the parameter outright.
    InvalidParameter,
    /// `E3_`: the command was a no-op; `active` is the state already in
    /// effect, inferred from the message text.
    Unchanged { active: bool },
    /// Anything without a recognizable prefix, kept verbatim.
    UnrecognizedResponse(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }
}

/// Classify a prefix-coded acknowledgement body.
pub fn classify_prefixed_ack(body: &str) -> CommandOutcome {
    if body.starts_with("S0_") {
        return CommandOutcome::Success;
    }
    if body.starts_with("E0_") {
        return CommandOutcome::InternalError;
    }
    if let Some(message) = body.strip_prefix("E1_") {
        return classify_out_of_range(body, message);
    }
    if body.starts_with("E2_") {
        return CommandOutcome::InvalidParameter;
    }
    if let Some(message) = body.strip_prefix("E3_") {
        // Literal substring check, exactly what the firmware contract gives
        // us. Note "deactivated" contains "activate" and therefore reads as
        // active; the message wording is the device's to choose.
        return CommandOutcome::Unchanged {
            active: message.contains("activate"),
        };
    }

    CommandOutcome::UnrecognizedResponse(body.to_string())
}

/// `E1_` messages read like `E1_Value must be between 6 and 32`. The bounds
/// sit between the literals `"between "` and `" and "`; firmware builds that
/// omit or reword them leave us nothing to parse, so the whole reply degrades
/// to [`CommandOutcome::UnrecognizedResponse`].
fn classify_out_of_range(raw: &str, message: &str) -> CommandOutcome {
    let Some((_, after_between)) = message.split_once("between ") else {
        return CommandOutcome::UnrecognizedResponse(raw.to_string());
    };
    let Some((min_text, max_text)) = after_between.split_once(" and ") else {
        return CommandOutcome::UnrecognizedResponse(raw.to_string());
    };

    let min = min_text.trim().parse::<f64>();
    let max = max_text
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok());

    match (min, max) {
        (Ok(min), Some(max)) => CommandOutcome::OutOfRange { min, max },
        _ => CommandOutcome::UnrecognizedResponse(raw.to_string()),
    }
}
