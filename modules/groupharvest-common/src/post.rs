//! The canonical post record and its identity rules.
//!
//! Older persisted schemas with fewer fields are expressed as `Post` values
//! with the optional fields absent, not as distinct types. Field names on
//! the wire stay camelCase so previously written result files keep loading.

use serde::{Deserialize, Serialize};

/// One extracted group post. Immutable once built; appended to a result set
/// and only ever superseded by a full-file rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub author_name: String,
    /// Absent for posts that don't link the author (anonymous or
    /// page-authored posts).
    #[serde(default)]
    pub author_url: Option<String>,
    #[serde(default)]
    pub author_avatar: Option<String>,
    /// Site-rendered tooltip text, kept verbatim.
    pub date: String,
    /// Canonicalized permalink, query string stripped.
    pub permalink: String,
    /// Last path segment of `permalink`.
    pub id: String,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub content_html: Option<String>,
    /// Ordered image URLs found in the attachment sub-region.
    #[serde(default)]
    pub images: Vec<String>,
}

/// Dedup key for a post. Permalink when the schema carries one, otherwise
/// the (author, content) pair older result files were keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostIdentity {
    Permalink(String),
    AuthorContent {
        author: String,
        content: Option<String>,
    },
}

impl Post {
    pub fn identity(&self) -> PostIdentity {
        if self.permalink.is_empty() {
            PostIdentity::AuthorContent {
                author: self.author_name.clone(),
                content: self.content_text.clone(),
            }
        } else {
            PostIdentity::Permalink(self.permalink.clone())
        }
    }

    /// Two records describe the same post iff their identities match.
    pub fn same_post(&self, other: &Post) -> bool {
        self.identity() == other.identity()
    }
}

/// Strip the query string (and anything after it) from a raw href,
/// including a trailing `/?...` form, then drop any trailing slash.
pub fn strip_query(raw: &str) -> String {
    let head = match raw.split_once('?') {
        Some((head, _)) => head,
        None => raw,
    };
    head.trim_end_matches('/').to_string()
}

/// Canonicalize a raw permalink href into `(permalink, id)` where `id` is
/// the last path segment of the query-stripped URL.
pub fn canonicalize_permalink(raw: &str) -> (String, String) {
    let permalink = strip_query(raw);
    let id = permalink
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    (permalink, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(permalink: &str, author: &str, text: Option<&str>) -> Post {
        let (permalink, id) = canonicalize_permalink(permalink);
        Post {
            author_name: author.to_string(),
            author_url: None,
            author_avatar: None,
            date: "March 3 at 10:14".to_string(),
            permalink,
            id,
            content_text: text.map(String::from),
            content_html: text.map(|t| format!("<div>{t}</div>")),
            images: Vec::new(),
        }
    }

    #[test]
    fn id_is_last_path_segment_of_stripped_permalink() {
        let (permalink, id) = canonicalize_permalink(
            "https://www.facebook.com/groups/123/posts/456789/?comment_tracking=x",
        );
        assert_eq!(permalink, "https://www.facebook.com/groups/123/posts/456789");
        assert_eq!(id, "456789");
    }

    #[test]
    fn canonicalize_handles_href_without_query() {
        let (permalink, id) =
            canonicalize_permalink("https://www.facebook.com/groups/123/posts/42/");
        assert_eq!(permalink, "https://www.facebook.com/groups/123/posts/42");
        assert_eq!(id, "42");
    }

    #[test]
    fn identity_prefers_permalink() {
        let a = post("https://example.com/groups/1/posts/9/?x=1", "Ann", Some("hi"));
        let b = post("https://example.com/groups/1/posts/9/", "Bob", Some("other"));
        assert!(a.same_post(&b));
    }

    #[test]
    fn identity_falls_back_to_author_and_content() {
        let mut a = post("", "Ann", Some("same words"));
        let mut b = post("", "Ann", Some("same words"));
        a.permalink.clear();
        b.permalink.clear();
        assert!(a.same_post(&b));

        let mut c = post("", "Ann", Some("different words"));
        c.permalink.clear();
        assert!(!a.same_post(&c));
    }

    #[test]
    fn wire_schema_is_camel_case() {
        let p = post("https://example.com/groups/1/posts/9/", "Ann", None);
        let json = serde_json::to_string(&p).expect("serializes");
        assert!(json.contains("\"authorName\""));
        assert!(json.contains("\"contentText\""));
        assert!(!json.contains("author_name"));
    }

    #[test]
    fn loads_older_schema_without_optional_fields() {
        let raw = r#"{
            "authorName": "Ann",
            "date": "yesterday",
            "permalink": "https://example.com/groups/1/posts/9",
            "id": "9"
        }"#;
        let p: Post = serde_json::from_str(raw).expect("older schema still loads");
        assert_eq!(p.author_name, "Ann");
        assert!(p.author_url.is_none());
        assert!(p.images.is_empty());
    }
}
