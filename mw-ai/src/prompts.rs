//! Prompt templates
//!
//! Both prompts ask for a bare JSON array; the parsers still tolerate
//! commentary around it.

/// Ask for the learnable words and phrases in `text`
pub fn extraction_prompt(text: &str) -> String {
    format!(
        "Extract the English words and fixed phrases worth studying from the text below.\n\
         Rules:\n\
         - Return ONLY a JSON array of strings, e.g. [\"abandon\", \"give_up\"].\n\
         - Use the dictionary form (lemma) of each word.\n\
         - Join the words of a multi-word phrase with underscores.\n\
         - Skip names, numbers and very common function words.\n\
         - Do not repeat an item.\n\
         \n\
         Text:\n{}",
        text.trim()
    )
}

/// Ask for one dictionary entry per term
pub fn synthesis_prompt(terms: &[String]) -> String {
    let list = terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "'")))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Create vocabulary entries for these terms: [{}]\n\
         Return ONLY a JSON array with one object per term, in the same order, shaped as:\n\
         [{{\"word\": \"give up\", \"phonetic\": \"/ɡɪv ʌp/\", \
         \"senses\": [{{\"pos\": \"v\", \"meaning\": \"放弃\"}}], \
         \"definition_en\": \"to stop trying\", \
         \"example\": \"Never give up on your dreams.\", \
         \"memory_method\": \"give + up: hand it over\", \
         \"forms\": [{{\"form\": \"gave up\", \"label\": \"past\"}}]}}]\n\
         Rules:\n\
         - \"word\" is the dictionary form; write phrases with spaces.\n\
         - \"senses\" lists every common meaning, each with a part of speech and a concise Simplified Chinese meaning.\n\
         - \"forms\" lists inflections or derived forms; use [] when there are none.\n\
         - No markdown, no commentary.",
        list
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_prompt_embeds_text() {
        let prompt = extraction_prompt("  I want to give up today.  ");
        assert!(prompt.ends_with("I want to give up today."));
        assert!(prompt.contains("JSON array of strings"));
    }

    #[test]
    fn test_synthesis_prompt_lists_terms() {
        let prompt = synthesis_prompt(&["give up".to_string(), "say \"hi\"".to_string()]);
        assert!(prompt.contains("[\"give up\", \"say 'hi'\"]"));
        assert!(prompt.contains("\"senses\""));
        assert!(prompt.contains("\"memory_method\""));
    }
}
