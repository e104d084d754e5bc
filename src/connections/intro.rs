use crate::connections::model::IntakeMessage;

/// Phrasing variant for the generated intro sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroMode<'a> {
    /// Care-seeker reached out; phrased from the seeker's perspective.
    Inquiry,
    /// Provider seeded the connection; phrased from the provider's
    /// perspective.
    ProviderOutreach { provider_name: &'a str },
}

/// Pick the care type the intro should talk about. Priority: explicit
/// intake override, then the first case-insensitive intersection of the
/// two care-type lists (in the seeker's declared order), then the
/// seeker's first declared type.
fn resolve_care_type<'a>(
    seeker_care_types: &'a [String],
    provider_care_types: &[String],
    intake: &'a IntakeMessage,
) -> Option<&'a str> {
    if let Some(explicit) = intake.care_type.as_deref() {
        if !explicit.trim().is_empty() {
            return Some(explicit);
        }
    }
    seeker_care_types
        .iter()
        .find(|seeker_type| {
            provider_care_types
                .iter()
                .any(|provider_type| provider_type.eq_ignore_ascii_case(seeker_type))
        })
        .or_else(|| seeker_care_types.first())
        .map(String::as_str)
}

/// Derive the human-readable intro sentence from structured intake.
/// Deterministic and idempotent: unchanged inputs always yield the
/// identical string, since this runs again on every intake edit.
pub fn generate(
    mode: IntroMode<'_>,
    seeker_care_types: &[String],
    provider_care_types: &[String],
    intake: &IntakeMessage,
) -> String {
    let care_type = resolve_care_type(seeker_care_types, provider_care_types, intake);

    match mode {
        IntroMode::Inquiry => {
            let mut intro = match care_type {
                Some(care_type) => format!("Looking for {} care", care_type),
                None => "Looking to connect about senior care options".to_string(),
            };
            if let Some(recipient) = intake.care_recipient.as_deref().filter(|r| !r.is_empty()) {
                intro.push_str(&format!(" for {}", recipient));
            }
            intro.push('.');
            if let Some(urgency) = intake.urgency.as_deref().filter(|u| !u.is_empty()) {
                intro.push_str(&format!(" Urgency: {}.", urgency));
            }
            intro
        }
        IntroMode::ProviderOutreach { provider_name } => match care_type {
            Some(care_type) => format!(
                "{} is interested in connecting about your {} care needs.",
                provider_name, care_type
            ),
            None => format!(
                "{} is interested in connecting about your care needs.",
                provider_name
            ),
        },
    }
}
