//! Outbound sanitization (spec §4.8 step 2, §7 "Security errors").

use messaging_domain::{Error, Payload};

/// Strips control characters and collapses the handful of patterns that
/// have historically been used to break platform renderers (zero-width
/// joiners used for spoofing, null bytes). Adapters still apply their own
/// platform-specific escaping on top of this.
pub trait Security: Send + Sync {
    fn sanitize_outbound(&self, payload: &Payload) -> Result<Payload, Error>;
}

pub struct DefaultSecurity;

impl Security for DefaultSecurity {
    fn sanitize_outbound(&self, payload: &Payload) -> Result<Payload, Error> {
        match payload {
            Payload::Text(text) => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
                    .collect();
                if cleaned.is_empty() && !text.is_empty() {
                    return Err(Error::SanitizeFailed("payload empty after sanitization".into()));
                }
                Ok(Payload::Text(cleaned))
            }
            Payload::Media(value) => Ok(Payload::Media(value.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters_but_keeps_newlines() {
        let security = DefaultSecurity;
        let input = Payload::Text("hi\u{0000}there\nfriend".into());
        let cleaned = security.sanitize_outbound(&input).unwrap();
        assert_eq!(cleaned.as_text().unwrap(), "hithere\nfriend");
    }
}
