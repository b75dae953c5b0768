//! Text normalization shared by all extraction stages.

/// Collapses bullets and Unicode space variants to one ASCII space.
///
/// Works line by line: newlines are kept, and each line is trimmed.
pub fn normalize_spaces(text: &str) -> String {
    text.lines()
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;
    for c in line.chars() {
        if is_space_like(c) {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

fn is_space_like(c: char) -> bool {
    matches!(
        c,
        '\u{00B7}' // middle dot
            | '\u{2022}' // bullet
            | '\u{00A0}' // no-break space
            | '\u{2007}' // figure space
            | '\u{202F}' // narrow no-break space
            | '\u{200B}' // zero width space
            | '\u{FEFF}' // byte order mark
    ) || (c.is_whitespace() && c != '\n')
}

/// Lowercases and strips Latin diacritics ("Destinação" -> "destinacao").
pub fn fold(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).map(strip_accent).collect()
}

fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn is_confusable(c: char) -> bool {
    matches!(c, 'I' | 'l' | '|' | 'O')
}

fn numeric_char(c: char) -> bool {
    c.is_ascii_digit() || is_confusable(c) || c == '.' || c == ','
}

/// Maps letters OCR confuses with digits (`I`, `l`, `|` -> 1, `O` -> 0).
///
/// Only touches runs of digit-like characters that contain at least one real
/// digit and are not glued to a preceding letter, so "Oeiras" and "Rua" stay
/// as they are while "l2 min" and "7,5O €" are repaired. Never use the result
/// for address text.
pub fn correct_numeric(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if !numeric_char(chars[i]) {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && numeric_char(chars[i]) {
            i += 1;
        }
        let run = &chars[start..i];

        let has_digit = run.iter().any(|c| c.is_ascii_digit());
        let glued_before = start > 0 && chars[start - 1].is_alphabetic();
        let glued_after = i < chars.len() && chars[i].is_alphabetic() && !starts_unit(&chars[i..]);

        if has_digit && !glued_before && !glued_after {
            for &c in run {
                out.push(match c {
                    'I' | 'l' | '|' => '1',
                    'O' => '0',
                    other => other,
                });
            }
        } else {
            out.extend(run);
        }
    }

    out
}

fn starts_unit(rest: &[char]) -> bool {
    let word: String = rest
        .iter()
        .take_while(|c| c.is_alphabetic())
        .flat_map(|c| c.to_lowercase())
        .collect();
    matches!(
        word.as_str(),
        "km" | "m" | "min" | "mins" | "minute" | "minutes" | "minuto" | "minutos" | "eur"
    )
}

/// Removes leading characters that are neither letters nor digits.
pub fn strip_leading_symbols(line: &str) -> &str {
    line.trim_start_matches(|c: char| !c.is_alphanumeric()).trim()
}
