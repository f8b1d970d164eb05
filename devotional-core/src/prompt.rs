//! Prompts for devotional generation.

use crate::generator::PromptConstraints;

/// Build the system prompt.
pub fn system_prompt(word_target: usize) -> String {
    format!(
        r#"You are a thoughtful Christian devotional writer. Each day you write one short, original devotional for a general audience.

## Style
- About {word_target} words in the main content
- Warm, pastoral and concrete; one clear idea per devotional
- Ground the reflection in a single scripture passage
- Plain language; no clichés, no sermon outlines, no headings inside the content

## Originality
Readers receive a devotional every day. Repeating a title, a passage or an angle they have recently seen breaks their trust. Treat every exclusion you are given as a hard rule."#
    )
}

/// Build the user prompt for one draft.
pub fn user_prompt(constraints: &PromptConstraints) -> String {
    let mut prompt = String::new();

    match constraints.date {
        Some(date) => prompt.push_str(&format!(
            "Write the devotional for {}.\n",
            date.format("%A, %B %-d, %Y")
        )),
        None => prompt.push_str("Write today's devotional.\n"),
    }

    if !constraints.theme_hints.is_empty() {
        prompt.push_str("\n## Suggested Themes\nChoose one of: ");
        prompt.push_str(&constraints.theme_hints.join(", "));
        prompt.push('\n');
    }

    if !constraints.excluded_titles.is_empty() {
        prompt.push_str("\n## Titles Already Used\nDo not reuse or closely paraphrase any of these titles:\n");
        for title in &constraints.excluded_titles {
            prompt.push_str(&format!("- {title}\n"));
        }
    }

    if !constraints.excluded_references.is_empty() {
        prompt.push_str("\n## Passages Recently Used\nDo not base the devotional on any of these passages:\n");
        for reference in &constraints.excluded_references {
            prompt.push_str(&format!("- {reference}\n"));
        }
    }

    if let Some(extra) = &constraints.additional_constraint {
        prompt.push_str("\n## Important\n");
        prompt.push_str(extra);
        prompt.push('\n');
    }

    prompt.push_str(
        r#"
## Response Format
Respond with ONLY a JSON object (no markdown, no explanation outside the JSON):
{
  "title": "A short, distinctive title",
  "reference": "Book Chapter:Verse",
  "theme": "one-word theme",
  "content": "The devotional text",
  "prayer": "A two or three sentence closing prayer",
  "reflection": ["A question for the reader", "Another question"]
}"#,
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_system_prompt_mentions_word_target() {
        assert!(system_prompt(250).contains("About 250 words"));
    }

    #[test]
    fn test_unconstrained_prompt_has_no_exclusion_sections() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let prompt = user_prompt(&PromptConstraints::unconstrained(date));

        assert!(prompt.contains("Sunday, March 2, 2025"));
        assert!(!prompt.contains("Titles Already Used"));
        assert!(!prompt.contains("Passages Recently Used"));
        assert!(!prompt.contains("## Important"));
        assert!(prompt.contains("\"reference\""));
    }

    #[test]
    fn test_constraints_are_listed() {
        let constraints = PromptConstraints {
            date: None,
            excluded_titles: vec!["Walking in Faith".into()],
            excluded_references: vec!["John 3:16".into(), "Romans 8:28".into()],
            theme_hints: vec!["hope".into(), "joy".into()],
            additional_constraint: Some("Produce a distinctly different title and passage.".into()),
        };
        let prompt = user_prompt(&constraints);

        assert!(prompt.contains("- Walking in Faith\n"));
        assert!(prompt.contains("- John 3:16\n- Romans 8:28\n"));
        assert!(prompt.contains("Choose one of: hope, joy"));
        assert!(prompt.contains("distinctly different title and passage"));
    }
}
