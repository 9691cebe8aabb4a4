//! Text formatting codes used in map and player names.
//!
//! Codes start with `$`: `$fff` sets a colour, `$o`/`$w`/`$z` and friends
//! style the text, `$l[url]` / `$h[page]` open links and `$$` is a literal
//! dollar sign.

/// Removes every formatting code, keeping only the visible text.
pub fn strip_format_codes(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            stripped.push(c);
            continue;
        }
        let Some(code) = chars.next() else {
            break;
        };
        match code {
            '$' => stripped.push('$'),
            c if c.is_ascii_hexdigit() => {
                // Colours take up to three hex digits.
                for _ in 0..2 {
                    if chars.next_if(|c| c.is_ascii_hexdigit()).is_none() {
                        break;
                    }
                }
            }
            'l' | 'L' | 'h' | 'H' | 'p' | 'P' => {
                if chars.next_if_eq(&'[').is_some() {
                    for c in chars.by_ref() {
                        if c == ']' {
                            break;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    stripped
}
