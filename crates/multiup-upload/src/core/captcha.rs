use once_cell::sync::Lazy;
use regex::Regex;

// One glyph: an absolutely positioned span whose horizontal offset decides
// its place in the code, holding either a numeric entity or a literal char.
static GLYPH: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"(?is)<span[^>]*padding-left:\s*(\d+)px[^>]*>\s*(?:&#(\d+);|([^<\s]))\s*</span>"#).ok()
});

/// Solve a positional-glyph CAPTCHA.
///
/// The challenge renders each character at an inline `padding-left` offset,
/// in shuffled source order. Sorting the glyphs by offset and concatenating
/// them gives the code. Returns `None` when the markup holds no glyphs.
pub fn solve_positional_captcha(markup: &str) -> Option<String> {
    let re = GLYPH.as_ref()?;
    let mut glyphs: Vec<(u32, char)> = re
        .captures_iter(markup)
        .filter_map(|caps| {
            let offset = caps.get(1)?.as_str().parse().ok()?;
            let ch = match (caps.get(2), caps.get(3)) {
                (Some(code), _) => char::from_u32(code.as_str().parse().ok()?)?,
                (None, Some(lit)) => lit.as_str().chars().next()?,
                (None, None) => return None,
            };
            Some((offset, ch))
        })
        .collect();

    if glyphs.is_empty() {
        return None;
    }
    glyphs.sort_by_key(|(offset, _)| *offset);
    Some(glyphs.into_iter().map(|(_, ch)| ch).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyphs_are_read_left_to_right() {
        let markup = r#"
            <div style='width:80px;height:26px;direction:ltr;'>
            <span style='position:absolute;padding-left:42px;padding-top:5px;'>&#55;</span>
            <span style='position:absolute;padding-left:6px;padding-top:3px;'>&#51;</span>
            <span style='position:absolute;padding-left:60px;padding-top:4px;'>&#48;</span>
            <span style='position:absolute;padding-left:24px;padding-top:6px;'>&#49;</span>
            </div>"#;
        assert_eq!(solve_positional_captcha(markup).as_deref(), Some("3170"));
    }

    #[test]
    fn literal_glyphs_are_accepted() {
        let markup = r#"<span style="padding-left: 20px">b</span><span style="padding-left: 2px">a</span>"#;
        assert_eq!(solve_positional_captcha(markup).as_deref(), Some("ab"));
    }

    #[test]
    fn page_without_captcha_yields_none() {
        assert_eq!(solve_positional_captcha("<form><input name=login></form>"), None);
    }
}
