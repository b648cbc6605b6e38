// Rule-based sentence boundary detection for complaint narratives

use std::sync::LazyLock;

use fancy_regex::Regex;

// Terminal punctuation, optional closing quotes/brackets, then whitespace and
// something that can start a sentence.
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?]+["'”’)\]]*(?=\s+["'“‘(\[]?[\p{Lu}\d])"#).expect("valid regex")
});

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "approx", "dept", "acct", "jan",
    "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
];

/// Split text into sentences.
///
/// Blank lines always end a sentence. Whitespace inside a sentence is collapsed
/// to single spaces, so joining the output with `" "` is stable under re-splitting.
#[inline]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut paragraph = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            split_paragraph(&paragraph, &mut sentences);
            paragraph.clear();
        } else {
            paragraph.push_str(line);
            paragraph.push('\n');
        }
    }
    split_paragraph(&paragraph, &mut sentences);

    sentences
}

fn split_paragraph(paragraph: &str, sentences: &mut Vec<String>) {
    let mut start = 0;

    for found in SENTENCE_END.find_iter(paragraph).flatten() {
        if found.as_str() == "." && is_abbreviation(&paragraph[start..found.start()]) {
            continue;
        }
        push_sentence(&paragraph[start..found.end()], sentences);
        start = found.end();
    }

    push_sentence(&paragraph[start..], sentences);
}

fn push_sentence(raw: &str, sentences: &mut Vec<String>) {
    let sentence = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}

/// Whether the word right before a period marks an abbreviation rather than a sentence end
fn is_abbreviation(before_period: &str) -> bool {
    let Some(word) = before_period.split_whitespace().last() else {
        return false;
    };
    let word = word.trim_start_matches(['"', '\'', '(', '[', '“', '‘']);

    // Initials ("J."); the pronoun "I" ends sentences
    if word.chars().count() == 1 && word.chars().all(char::is_alphabetic) && word != "I" {
        return true;
    }
    // Dotted forms have short letter segments; "Paypal.com" is a domain, not one
    if word.contains('.')
        && word.split('.').all(|part| {
            (1..=2).contains(&part.chars().count()) && part.chars().all(char::is_alphabetic)
        })
    {
        return true;
    }

    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("I called the bank. They hung up! Why would they do that? Nobody knows.");
        assert_eq!(
            sentences,
            vec![
                "I called the bank.",
                "They hung up!",
                "Why would they do that?",
                "Nobody knows."
            ]
        );
    }

    #[test]
    fn keeps_abbreviations_together() {
        let sentences =
            split_sentences("I spoke to Mr. Smith on Jan. 5 about the U.S. Bank account. He was rude.");
        assert_eq!(
            sentences,
            vec![
                "I spoke to Mr. Smith on Jan. 5 about the U.S. Bank account.",
                "He was rude."
            ]
        );
    }

    #[test]
    fn pronoun_i_ends_a_sentence() {
        let sentences = split_sentences("The bank refused and so did I. Then I filed a complaint.");
        assert_eq!(
            sentences,
            vec!["The bank refused and so did I.", "Then I filed a complaint."]
        );

        let sentences = split_sentences("Letter from J. Doe arrived. It was late.");
        assert_eq!(
            sentences,
            vec!["Letter from J. Doe arrived.", "It was late."]
        );
    }

    #[test]
    fn domain_names_end_sentences() {
        let sentences = split_sentences("I paid through Paypal.com. The refund never came. Ask the U.S. office.");
        assert_eq!(
            sentences,
            vec![
                "I paid through Paypal.com.",
                "The refund never came.",
                "Ask the U.S. office."
            ]
        );
    }

    #[test]
    fn does_not_split_before_lowercase() {
        let sentences = split_sentences("The fee was 3.5 percent. the agent said it was normal.");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn blank_lines_end_sentences() {
        let sentences = split_sentences("First paragraph without a period\n\nSecond   paragraph\nwraps here.");
        assert_eq!(
            sentences,
            vec!["First paragraph without a period", "Second paragraph wraps here."]
        );
    }

    #[test]
    fn closing_quotes_stay_with_sentence() {
        let sentences = split_sentences("He said \"we cannot help you.\" Then he left.");
        assert_eq!(
            sentences,
            vec!["He said \"we cannot help you.\"", "Then he left."]
        );
    }

    #[test]
    fn redacted_dates_and_digits() {
        let sentences = split_sentences("On XX/XX/XXXX I paid {$200.00}. 3 days later it bounced.");
        assert_eq!(
            sentences,
            vec!["On XX/XX/XXXX I paid {$200.00}.", "3 days later it bounced."]
        );
    }

    #[test]
    fn empty_and_whitespace_input() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("  \n\t  \n").is_empty());
    }

    #[test]
    fn resplitting_joined_output_is_stable() {
        let text = "Account opened in 2019. Fees appeared!  Dr. Jones agreed?\n\nYes.";
        let sentences = split_sentences(text);
        assert_eq!(split_sentences(&sentences.join(" ")), sentences);
    }
}
