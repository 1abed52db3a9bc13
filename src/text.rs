//! Turning Mastodon HTML into text that fits in a tweet.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Twitter wraps every link in t.co, which always counts as this many chars.
pub const LINK_WEIGHT: usize = 23;

/// Code points Twitter counts as one; everything else (CJK, emoji) counts
/// as two.
const LIGHT_RANGES: [(u32, u32); 4] = [
    (0x0000, 0x10FF),
    (0x2000, 0x200D),
    (0x2010, 0x201F),
    (0x2032, 0x2037),
];
pub const ELLIPSIS: &str = "…";

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</p>\s*<p(\s[^>]*)?>").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").unwrap());
static TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+\n").unwrap());
static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[\s(])@([_\w])").unwrap());
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").unwrap());

/// Convert status HTML to plain text, keeping line and paragraph breaks.
pub fn html_to_text(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = PARAGRAPH_BREAK.replace_all(&text, "\n\n");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| decode_entity(caps));
    let text = TRAILING_SPACE.replace_all(&text, "\n");
    text.trim().to_string()
}

fn decode_entity(caps: &Captures) -> String {
    let name = &caps[1];
    let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => None,
        }
    };
    match decoded {
        Some(c) => c.to_string(),
        None => caps[0].to_string(),
    }
}

/// `@user` becomes `@.user` so mirrored text never notifies Twitter accounts
/// that happen to share a Mastodon handle.
pub fn escape_mentions(text: &str) -> String {
    MENTION.replace_all(text, "${1}@.${2}").into_owned()
}

pub fn char_weight(c: char) -> usize {
    let cp = c as u32;
    if LIGHT_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&cp)) {
        1
    } else {
        2
    }
}

fn plain_weight(text: &str) -> usize {
    text.chars().map(char_weight).sum()
}

fn word_weight(word: &str) -> usize {
    if URL.is_match(word) {
        LINK_WEIGHT
    } else {
        plain_weight(word)
    }
}

/// Length as Twitter counts it: every URL weighs [`LINK_WEIGHT`] and every
/// other code point weighs [`char_weight`].
pub fn weighted_len(text: &str) -> usize {
    let mut total = 0;
    let mut prev_end = 0;
    for word in WORD.find_iter(text) {
        total += plain_weight(&text[prev_end..word.start()]) + word_weight(word.as_str());
        prev_end = word.end();
    }
    total + plain_weight(&text[prev_end..])
}

/// Build the destination text: `text` cut to fit `max_chars - link_reserve`,
/// followed by a space and the back-link `url`.
///
/// When content has to be dropped the cut happens after the last whole word
/// that fits and [`ELLIPSIS`] is appended. A single word longer than the
/// whole budget is cut mid-word.
pub fn compose(text: &str, url: &str, max_chars: usize, link_reserve: usize) -> String {
    let limit = max_chars.saturating_sub(link_reserve);
    let text = text.trim();
    let body = if weighted_len(text) <= limit {
        text.to_string()
    } else {
        truncate(text, limit.saturating_sub(plain_weight(ELLIPSIS)))
    };

    if body.is_empty() {
        url.to_string()
    } else {
        format!("{} {}", body, url)
    }
}

fn truncate(text: &str, budget: usize) -> String {
    let mut cost = 0;
    let mut cut = 0;
    for word in WORD.find_iter(text) {
        let gap = plain_weight(&text[cut..word.start()]);
        let next = cost + gap + word_weight(word.as_str());
        if next > budget {
            break;
        }
        cost = next;
        cut = word.end();
    }

    let kept = if cut == 0 {
        hard_cut(text, budget)
    } else {
        text[..cut].to_string()
    };
    let kept = kept.trim_end();
    if kept.is_empty() {
        String::new()
    } else {
        format!("{}{}", kept, ELLIPSIS)
    }
}

fn hard_cut(text: &str, budget: usize) -> String {
    let mut cost = 0;
    text.chars()
        .take_while(|&c| {
            cost += char_weight(c);
            cost <= budget
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_paragraphs_and_breaks() {
        let html = "<p>Hello&nbsp;world<br />second line</p><p>next &amp; last</p>";
        assert_eq!(html_to_text(html), "Hello world\nsecond line\n\nnext & last");
    }

    #[test]
    fn html_links_keep_full_url() {
        let html = r#"<p>read <a href="https://example.com/a/long/path" rel="nofollow noopener" target="_blank"><span class="invisible">https://</span><span class="ellipsis">example.com/a/long</span><span class="invisible">/path</span></a></p>"#;
        assert_eq!(html_to_text(html), "read https://example.com/a/long/path");
    }

    #[test]
    fn html_hashtags_and_numeric_entities() {
        let html = r##"<p><a href="https://m.social/tags/rust" class="mention hashtag">#<span>rust</span></a> &#8212; &#x1F980; &#39;ok&#39; &bogus;</p>"##;
        assert_eq!(html_to_text(html), "#rust — 🦀 'ok' &bogus;");
    }

    #[test]
    fn mentions_are_escaped() {
        assert_eq!(escape_mentions("@alice hi (@bob) a@b"), "@.alice hi (@.bob) a@b");
        assert_eq!(escape_mentions("cc\n@carol"), "cc\n@.carol");
    }

    #[test]
    fn weighted_len_counts_links_as_23() {
        assert_eq!(weighted_len("abc"), 3);
        assert_eq!(weighted_len("see https://example.com/some/very/long/path/indeed ok"), 4 + 23 + 3);
    }

    #[test]
    fn short_text_is_untouched() {
        let out = compose("hello there", "https://m.social/@me/1", 280, 24);
        assert_eq!(out, "hello there https://m.social/@me/1");
    }

    #[test]
    fn empty_text_is_just_the_link() {
        assert_eq!(compose("  ", "https://m.social/@me/1", 280, 24), "https://m.social/@me/1");
    }

    #[test]
    fn long_text_cut_at_word_boundary_with_link() {
        let words: Vec<String> = (0..100).map(|i| format!("word{:01}", i % 10)).collect();
        let text = words.join(" ");
        assert!(text.chars().count() >= 500);
        let url = "https://mastodon.social/@me/1";
        assert_eq!(url.chars().count(), 29);

        let out = compose(&text, url, 280, 30);
        assert!(out.chars().count() <= 280, "{}", out.chars().count());
        assert!(out.ends_with(&format!("{} {}", ELLIPSIS, url)));

        let body = out.strip_suffix(&format!(" {}", url)).unwrap();
        let body = body.strip_suffix(ELLIPSIS).unwrap();
        assert!(text.starts_with(body));
        // cut lands on a boundary: the next char in the source is whitespace
        assert_eq!(text[body.len()..].chars().next(), Some(' '));
        assert!(body.chars().count() <= 249);
    }

    #[test]
    fn truncation_counts_inline_links_as_23() {
        let long_link = format!("https://example.com/{}", "x".repeat(200));
        let text = format!("{} {}", long_link, "tail ".repeat(60));
        let out = compose(&text, "https://m.social/@me/2", 280, 24);
        assert!(out.starts_with(&long_link));
        assert!(weighted_len(&out) <= 280);
        assert!(out.contains(ELLIPSIS));
    }

    #[test]
    fn single_huge_word_is_hard_cut() {
        let text = "a".repeat(400);
        let out = compose(&text, "https://m.social/@me/3", 100, 24);
        let body = out.strip_suffix(" https://m.social/@me/3").unwrap();
        // the ellipsis weighs two
        assert_eq!(body.chars().count(), 75);
        assert_eq!(weighted_len(body), 76);
        assert!(body.ends_with(ELLIPSIS));
    }

    #[test]
    fn char_weights_follow_twitter_ranges() {
        assert_eq!(char_weight('a'), 1);
        assert_eq!(char_weight('é'), 1);
        assert_eq!(char_weight('\u{201C}'), 1);
        assert_eq!(char_weight('日'), 2);
        assert_eq!(char_weight('🦀'), 2);
        assert_eq!(weighted_len("日本 abc 🦀"), 4 + 1 + 3 + 1 + 2);
    }

    #[test]
    fn cjk_text_is_cut_by_weight() {
        let text = "日本語のテキスト。".repeat(28);
        let url = "https://m.social/@me/4";
        let out = compose(&text, url, 280, 24);
        assert!(weighted_len(&out) <= 280, "{}", weighted_len(&out));
        let body = out.strip_suffix(&format!(" {}", url)).unwrap();
        let body = body.strip_suffix(ELLIPSIS).unwrap();
        assert!(text.starts_with(body));
        assert_eq!(weighted_len(body), 254);
    }

    #[test]
    fn emoji_text_is_cut_by_weight_at_word_boundary() {
        let text = "🦀 ".repeat(150);
        let url = "https://m.social/@me/5";
        let out = compose(&text, url, 280, 24);
        assert!(weighted_len(&out) <= 280, "{}", weighted_len(&out));
        assert!(out.ends_with(&format!("🦀{} {}", ELLIPSIS, url)));
    }
}
