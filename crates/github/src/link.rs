//! `Link` header parsing for paginated REST responses
//!
//! GitHub advertises further pages as
//! `<https://api.github.com/user/repos?page=2>; rel="next", <...>; rel="last"`.

/// Target of the `rel="next"` entry, if any.
pub fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target.strip_prefix('<')?.strip_suffix('>')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_next_among_several_relations() {
        let header = r#"<https://api.github.com/user/repos?page=1>; rel="prev", <https://api.github.com/user/repos?page=3>; rel="next", <https://api.github.com/user/repos?page=9>; rel="last""#;
        assert_eq!(
            next_link(header),
            Some("https://api.github.com/user/repos?page=3")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let header = r#"<https://api.github.com/user/repos?page=1>; rel="first", <https://api.github.com/user/repos?page=8>; rel="prev""#;
        assert_eq!(next_link(header), None);
    }

    #[test]
    fn malformed_target_is_ignored() {
        assert_eq!(next_link(r#"https://example.com; rel="next""#), None);
        assert_eq!(next_link(""), None);
    }
}
