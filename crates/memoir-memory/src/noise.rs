// SPDX-FileCopyrightText: 2026 Memoir Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Noise detection shared by the retriever's adaptive filter and the
//! extractor's capture gate.

/// Greetings, acknowledgements, and affirmations that carry no recallable
/// signal. Matched case-insensitively after trimming and stripping trailing
/// punctuation.
const NOISE_PATTERNS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "yo",
    "thanks",
    "thank you",
    "thx",
    "ty",
    "ok",
    "okay",
    "k",
    "kk",
    "yes",
    "no",
    "yep",
    "yeah",
    "nope",
    "nah",
    "sure",
    "cool",
    "nice",
    "great",
    "awesome",
    "perfect",
    "got it",
    "gotcha",
    "sounds good",
    "will do",
    "bye",
    "goodbye",
    "good morning",
    "good afternoon",
    "good evening",
    "good night",
    "lol",
    "haha",
    "hmm",
    "um",
    "huh",
    "wow",
    "test",
    "testing",
];

/// True when the text is a greeting/acknowledgement with no recallable
/// content.
pub fn is_noise(text: &str) -> bool {
    let trimmed = text
        .trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_lowercase();
    if trimmed.is_empty() {
        return true;
    }
    NOISE_PATTERNS.contains(&trimmed.as_str())
}
