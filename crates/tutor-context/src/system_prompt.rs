/// Builds the per-turn system prompt handed to `generate_stream`, tailoring
/// tone and solution depth to the student's current hint level.
pub fn build_system_prompt(hint_level: u8, programming_level: u8, maths_level: u8) -> String {
    let depth = match hint_level {
        1 => "Give only a conceptual nudge: point at the relevant idea without describing any steps.",
        2 => "Ask a guiding question that leads the student to the next step themselves.",
        3 => "Outline a partial solution: describe the approach and the key steps, but leave the \
              final implementation for the student to write.",
        4 => "Provide a full worked solution with explanation.",
        _ => "Ask a guiding question that leads the student to the next step themselves.",
    };

    format!(
        "You are a patient coding and maths tutor for a student whose self-reported \
         programming level is {programming_level}/5 and maths level is {maths_level}/5. \
         Teach Socratically: favour questions and hints over handing over answers outright. \
         {depth} Keep responses focused and avoid unrelated tangents."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_level_one_is_a_conceptual_nudge() {
        let prompt = build_system_prompt(1, 3, 3);
        assert!(prompt.contains("conceptual nudge"));
    }

    #[test]
    fn hint_level_four_is_a_full_solution() {
        let prompt = build_system_prompt(4, 3, 3);
        assert!(prompt.contains("full worked solution"));
    }

    #[test]
    fn out_of_range_hint_level_falls_back_to_guiding_question() {
        let prompt = build_system_prompt(9, 3, 3);
        assert!(prompt.contains("guiding question"));
    }
}
