use crate::classify::TopicFilter;

/// Hand-authored canned response text, one per filter kind, personalised
/// with the user's display name.
pub fn canned_response(filter: TopicFilter, display_name: &str) -> Option<String> {
    match filter {
        TopicFilter::Greeting => Some(format!(
            "Hi {display_name}! I'm your tutor — ask me a programming or maths question \
             you're working through, and I'll help you reason through it."
        )),
        TopicFilter::OffTopic => Some(format!(
            "{display_name}, I'm built to help with programming and maths questions. \
             Could you share the problem you're working on?"
        )),
        TopicFilter::OnTopic => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_interpolates_display_name() {
        let text = canned_response(TopicFilter::Greeting, "Ada").unwrap();
        assert!(text.contains("Ada"));
    }

    #[test]
    fn on_topic_has_no_canned_response() {
        assert!(canned_response(TopicFilter::OnTopic, "Ada").is_none());
    }
}
