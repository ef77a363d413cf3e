//! Backslash escaping for delimiter-separated lists.
//!
//! Every level of the path grammar (slash-separated segments, comma-separated
//! arguments, `key=value` pairs, entity parts) goes through the same four
//! helpers with its own delimiter. For any non-empty list `items`,
//! `split(&join(&items, d), d) == items`.

const ESCAPE: char = '\\';

/// Prefix every backslash and every `delimiter` in `value` with a backslash.
pub fn escape(value: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == ESCAPE || ch == delimiter {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out
}

/// Inverse of [`escape`] for the same delimiter.
pub fn unescape(value: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != ESCAPE {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(next) if next == ESCAPE || next == delimiter => out.push(next),
            Some(next) => {
                out.push(ESCAPE);
                out.push(next);
            }
            None => out.push(ESCAPE),
        }
    }
    out
}

/// Escape each item and join with `delimiter`.
pub fn join<S: AsRef<str>>(items: &[S], delimiter: char) -> String {
    items
        .iter()
        .map(|item| escape(item.as_ref(), delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string())
}

/// Split on unescaped `delimiter` and unescape each part.
///
/// Always yields at least one item; `split("", d)` is `[""]`.
pub fn split(value: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut raw = String::new();
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == ESCAPE {
            raw.push(ch);
            if let Some(next) = chars.next() {
                raw.push(next);
            }
        } else if ch == delimiter {
            parts.push(unescape(&raw, delimiter));
            raw.clear();
        } else {
            raw.push(ch);
        }
    }
    parts.push(unescape(&raw, delimiter));
    parts
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Every delimiter the path grammar escapes on.
    fn delimiter() -> impl Strategy<Value = char> {
        prop::sample::select(vec!['/', ',', '=', '!', ':', '~', ']'])
    }

    proptest! {
        #[test]
        fn unescape_inverts_escape(value in "\\PC*", d in delimiter()) {
            prop_assert_eq!(unescape(&escape(&value, d), d), value);
        }

        /// Items are drawn mostly from delimiters and backslashes.
        #[test]
        fn split_inverts_join_for_any_list(
            items in prop::collection::vec("[a-c/,=!:~\\]\\\\]{0,6}", 1..6),
            d in delimiter(),
        ) {
            prop_assert_eq!(split(&join(&items, d), d), items);
        }
    }

    #[test]
    fn escape_round_trips_delimiters_and_backslashes() {
        for value in ["", "plain", "a,b", ",", "\\", "a\\,b", "trailing\\", ",,\\\\,"] {
            assert_eq!(unescape(&escape(value, ','), ','), value);
        }
    }

    #[test]
    fn split_inverts_join() {
        let cases: Vec<Vec<&str>> = vec![
            vec![""],
            vec!["", ""],
            vec!["a"],
            vec!["a/b", "c"],
            vec!["\\", "/", "x\\/y"],
            vec!["/", "", "//"],
        ];
        for items in cases {
            let joined = join(&items, '/');
            assert_eq!(split(&joined, '/'), items, "joined: {joined}");
        }
    }

    /// Escapes meant for an inner level survive an outer split untouched.
    #[test]
    fn nested_levels_do_not_interfere() {
        let inner = join(&["a,b", "c"], ',');
        let outer = join(&[inner.as_str(), "d/e"], '/');
        let parts = split(&outer, '/');
        assert_eq!(parts, vec![inner.clone(), "d/e".to_string()]);
        assert_eq!(split(&parts[0], ','), vec!["a,b", "c"]);
    }

    #[test]
    fn unescape_keeps_foreign_escapes() {
        assert_eq!(unescape("a\\,b", '/'), "a\\,b");
        assert_eq!(unescape("a\\/b", '/'), "a/b");
    }
}
