// ampcache_rewriter::script
//
// Script/direction classification for human-readable cache labels.
//
// Joining the labels of a host into one label can put characters next to
// each other that were never in the same label before.  A label that holds
// right-to-left text must stay free of left-to-right letters, and must not
// mix the two Arabic digit ranges, otherwise bidi reordering can make it
// render like a different host.
//
// The table below is compiled in and sorted by range start.  Code points
// outside it are left-to-right when alphabetic and neutral otherwise.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptClass {
    /// Left-to-right letters (Latin, Cyrillic, Han, ...).
    Ltr,
    /// Right-to-left scripts: Hebrew, Arabic, Syriac, Thaana, N'Ko, ...
    Rtl,
    /// ARABIC-INDIC DIGIT ZERO..NINE (bidi class AN).
    ArabicIndicDigit,
    /// ASCII digits and EXTENDED ARABIC-INDIC digits (bidi class EN).
    EuropeanDigit,
    /// Hyphens, marks, symbols.
    Neutral,
}

const SCRIPT_RANGES: &[(u32, u32, ScriptClass)] = &[
    (0x002D, 0x002D, ScriptClass::Neutral),
    (0x0030, 0x0039, ScriptClass::EuropeanDigit),
    (0x0590, 0x05FF, ScriptClass::Rtl),
    (0x0600, 0x065F, ScriptClass::Rtl),
    (0x0660, 0x0669, ScriptClass::ArabicIndicDigit),
    (0x066A, 0x06EF, ScriptClass::Rtl),
    (0x06F0, 0x06F9, ScriptClass::EuropeanDigit),
    (0x06FA, 0x08FF, ScriptClass::Rtl),
    (0xFB1D, 0xFDFF, ScriptClass::Rtl),
    (0xFE70, 0xFEFF, ScriptClass::Rtl),
    (0x10800, 0x10FFF, ScriptClass::Rtl),
    (0x1E800, 0x1EFFF, ScriptClass::Rtl),
];

/// Classify a single character.
pub fn classify(c: char) -> ScriptClass {
    let cp = c as u32;
    let hit = SCRIPT_RANGES.binary_search_by(|&(start, end, _)| {
        if cp < start {
            std::cmp::Ordering::Greater
        } else if cp > end {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Equal
        }
    });
    match hit {
        Ok(idx) => SCRIPT_RANGES[idx].2,
        Err(_) if c.is_alphabetic() => ScriptClass::Ltr,
        Err(_) => ScriptClass::Neutral,
    }
}

/// Whether a (Unicode) label is free of direction and digit-range mixing.
pub fn label_is_safe(label: &str) -> bool {
    let mut ltr = false;
    let mut rtl = false;
    let mut arabic_indic = false;
    let mut european = false;

    for c in label.chars() {
        match classify(c) {
            ScriptClass::Ltr => ltr = true,
            ScriptClass::Rtl => rtl = true,
            ScriptClass::ArabicIndicDigit => {
                rtl = true;
                arabic_indic = true;
            }
            ScriptClass::EuropeanDigit => european = true,
            ScriptClass::Neutral => {}
        }
    }

    if rtl && ltr {
        return false;
    }
    !(rtl && arabic_indic && european)
}
