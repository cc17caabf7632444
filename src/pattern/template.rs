//! Response templates with positional group references

/// Substitute capture groups into a response template.
///
/// `\N` is replaced by group `N` of `groups` (1-based, so `\1` is
/// `groups[0]`). The longest run of digits after the backslash names the
/// group; a reference to a group that does not exist is left as written.
/// `\\N` produces a literal `\N`. Every other character, including other
/// backslashes, is copied unchanged.
///
/// ```
/// use expectkit::expand_template;
///
/// let groups = vec!["vf11.hnd01.net".to_string()];
/// assert_eq!(expand_template(r"show arp \1", &groups), "show arp vf11.hnd01.net");
/// assert_eq!(expand_template(r"literal \\1", &groups), r"literal \1");
/// ```
pub fn expand_template(template: &str, groups: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('\\') {
            let digits = leading_digits(tail);
            if digits > 0 {
                out.push('\\');
                out.push_str(&tail[..digits]);
                rest = &tail[digits..];
            } else {
                out.push_str("\\\\");
                rest = tail;
            }
            continue;
        }

        let digits = leading_digits(after);
        let group = after[..digits]
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=groups.len()).contains(n));

        match group {
            Some(n) => {
                out.push_str(&groups[n - 1]);
                rest = &after[digits..];
            }
            None => {
                out.push('\\');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn groups(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_reference() {
        assert_eq!(expand_template(r"hello \1!", &groups(&["bob"])), "hello bob!");
    }

    #[test]
    fn test_multiple_and_repeated_references() {
        let g = groups(&["a", "b"]);
        assert_eq!(expand_template(r"\2-\1-\2", &g), "b-a-b");
    }

    #[test]
    fn test_multi_digit_reference() {
        let g: Vec<String> = (1..=12).map(|i| format!("g{}", i)).collect();
        assert_eq!(expand_template(r"\12|\1", &g), "g12|g1");
    }

    #[test]
    fn test_missing_group_left_as_written() {
        assert_eq!(expand_template(r"x \3 \0 y", &groups(&["a"])), r"x \3 \0 y");
    }

    #[test]
    fn test_escaped_reference() {
        assert_eq!(expand_template(r"\\1 \1", &groups(&["v"])), r"\1 v");
    }

    #[test]
    fn test_other_backslashes_survive() {
        assert_eq!(expand_template("a\\nb\\", &[]), "a\\nb\\");
        assert_eq!(expand_template(r"\\x", &[]), r"\\x");
    }

    #[test]
    fn test_empty_group_expands_to_nothing() {
        assert_eq!(expand_template(r"[\1]", &groups(&[""])), "[]");
    }

    proptest! {
        #[test]
        fn prop_no_backslash_is_identity(template in "[^\\\\]*", g in prop::collection::vec(".*", 0..4)) {
            prop_assert_eq!(expand_template(&template, &g), template);
        }

        #[test]
        fn prop_reference_inserts_group(prefix in "[a-z ]*", value in "[^\\\\]*") {
            let template = format!("{}\\1", prefix);
            prop_assert_eq!(expand_template(&template, &[value.clone()]), format!("{}{}", prefix, value));
        }
    }
}
