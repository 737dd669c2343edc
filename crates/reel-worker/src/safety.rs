//! Content safety preprocessing.
//!
//! Image prompts that are likely to be refused by the image model are removed
//! before the first render. Removal only: no prompt is rewritten, and the
//! beat keeps its speaker and text.

use reel_models::ScriptDocument;

/// Lower-case substrings that strip a beat's image fields.
pub const DENYLIST: &[&str] = &[
    // explicit
    "nude",
    "naked",
    "nsfw",
    "explicit",
    "sexual",
    "porn",
    "erotic",
    "lingerie",
    // violence
    "blood",
    "gory",
    "gruesome",
    "corpse",
    "dead body",
    "decapitat",
    "dismember",
    "massacre",
    "murder",
    "torture",
    "handgun",
    "gunfire",
    "gunshot",
    "rifle",
    "weapon",
    "knife",
    "stabbing",
    "bomb",
    "explosion",
    // self-harm
    "suicide",
    "self-harm",
    "self harm",
    "noose",
    "overdose",
    "cutting wrist",
    // drugs
    "cocaine",
    "methamphetamine",
    "drug use",
    "syringe",
    // extremism-adjacent
    "terrorist",
    "terrorism",
    "nazi",
    "swastika",
    "extremist",
];

/// Whether a prompt matches the denylist.
pub fn is_unsafe_prompt(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    DENYLIST.iter().any(|term| lower.contains(term))
}

/// Remove the image fields of every beat with an unsafe prompt.
///
/// Returns the sanitized script and the indices of the beats that were
/// changed, in ascending order.
pub fn sanitize(script: &ScriptDocument) -> (ScriptDocument, Vec<usize>) {
    let mut sanitized = script.clone();
    let mut removed = Vec::new();

    for (index, beat) in sanitized.beats.iter_mut().enumerate() {
        if beat.image_prompts().any(is_unsafe_prompt) {
            beat.clear_image();
            removed.push(index);
        }
    }

    (sanitized, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn script() -> ScriptDocument {
        serde_json::from_value(json!({
            "beats": [
                {"speaker": "Narrator", "text": "Once upon a time", "imagePrompt": "a quiet village at dawn"},
                {"speaker": "Hero", "text": "Stop right there!", "imagePrompt": "A BLOODY sword fight"},
                {"speaker": "Narrator", "text": "And then", "image": {"type": "image", "prompt": "Soldiers with a Rifle"}},
                {"speaker": "Villain", "text": "No image here"},
                {"speaker": "Narrator", "text": "The end", "image": {"type": "image", "source": {"kind": "url", "url": "https://cdn.example.com/x.png"}}}
            ],
            "speechConfig": {"voice": "alloy"}
        }))
        .unwrap()
    }

    #[test]
    fn test_matches_are_case_insensitive() {
        assert!(is_unsafe_prompt("Portrait of a NAZI officer"));
        assert!(!is_unsafe_prompt("a sunny meadow with horses"));
    }

    #[test]
    fn test_sanitize_removes_only_matching_images() {
        let original = script();
        let (sanitized, removed) = sanitize(&original);

        assert_eq!(removed, vec![1, 2]);
        assert!(!sanitized.beats[1].has_image());
        assert!(!sanitized.beats[2].has_image());
        assert_eq!(sanitized.beats[0], original.beats[0]);
        assert_eq!(sanitized.beats[3], original.beats[3]);
        assert_eq!(sanitized.beats[4], original.beats[4]);
        assert_eq!(sanitized.speech_config, original.speech_config);
    }

    #[test]
    fn test_sanitize_keeps_speech() {
        let original = script();
        let (sanitized, _) = sanitize(&original);

        for (before, after) in original.beats.iter().zip(&sanitized.beats) {
            assert_eq!(before.speaker, after.speaker);
            assert_eq!(before.text, after.text);
        }
    }

    #[test]
    fn test_speech_is_not_scanned() {
        let original: ScriptDocument = serde_json::from_value(json!({
            "beats": [{"speaker": "Narrator", "text": "There was blood everywhere", "imagePrompt": "an empty room"}]
        }))
        .unwrap();

        let (sanitized, removed) = sanitize(&original);
        assert!(removed.is_empty());
        assert_eq!(sanitized, original);
    }
}
