//! IPA → token IDs for the ONNX graph.
//!
//! The vocabulary is `[pad] + punctuation + ASCII letters + IPA letters`, in
//! that order; the index of a symbol is its token ID, so the ordering is part
//! of the model contract.  Symbols outside the vocabulary are dropped.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

const PAD: char = '$';

const PUNCTUATION: &str = ";:,.!?¡¿—…\u{201C}«»\u{201D}\" ";

const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

// Includes the combining mark U+0329 and curly quotes as standalone symbols.
const IPA_LETTERS: &str =
    "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘\u{2019}\u{0329}\u{2018}ᵻ";

static VOCAB: Lazy<HashMap<char, i64>> = Lazy::new(|| {
    std::iter::once(PAD)
        .chain(PUNCTUATION.chars())
        .chain(LETTERS.chars())
        .chain(IPA_LETTERS.chars())
        .zip(0i64..)
        .collect()
});

/// Words or single punctuation marks.
static WORD_OR_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+|[^\w\s]").expect("static regex is valid"));

/// Re-space an IPA string so every word and punctuation mark stands alone,
/// e.g. `"hɛloʊ, wɜːld!"` → `"hɛloʊ , wɜːld !"`.
pub fn respace(ipa: &str) -> String {
    WORD_OR_MARK.find_iter(ipa).map(|m| m.as_str()).collect::<Vec<_>>().join(" ")
}

pub fn symbol_id(c: char) -> Option<i64> {
    VOCAB.get(&c).copied()
}

/// Token IDs for an IPA string, wrapped in pad tokens (`0 … 0`).
pub fn ipa_to_ids(ipa: &str) -> Vec<i64> {
    let spaced = respace(ipa);
    let mut ids = Vec::with_capacity(spaced.len() + 2);
    ids.push(0);
    ids.extend(spaced.chars().filter_map(symbol_id));
    ids.push(0);
    ids
}
