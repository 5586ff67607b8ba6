// Escaping of free-text fields.
//
// Records are `/`-separated fields terminated by a newline, so any field that
// can carry arbitrary text (colors, fonts, text bodies) must not contain those
// bytes raw. Each structurally significant character is replaced by an
// entity-style sequence introduced by `&`. The introducer itself is escaped as
// `&amp;`, which means every `&` in escaped text starts exactly one entity and
// `unescape` can decode in a single left-to-right pass.

/// Characters that must never appear raw inside a field, with their escaped
/// forms. `&` is the introducer of every other expansion.
pub const ESCAPES: [(char, &str); 6] = [
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('\n', "&nl;"),
    ('\t', "&tab;"),
    ('/', "&fs;"),
    ('&', "&amp;"),
];

/// Replace every special character in `text` with its escape sequence.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == ch) {
            Some((_, expansion)) => out.push_str(expansion),
            None => out.push(ch),
        }
    }
    out
}

/// Exact inverse of [`escape`].
///
/// An `&` that does not start a known sequence is kept literally, so text
/// written by a peer that skipped escaping still decodes to something sane.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ESCAPES
            .iter()
            .find(|(_, expansion)| rest.starts_with(expansion))
        {
            Some((raw, expansion)) => {
                out.push(*raw);
                rest = &rest[expansion.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
