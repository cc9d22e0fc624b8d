//! Versioned catalog of locators for the target site's desktop markup.
//!
//! Every locator the engine touches lives here; extraction code is written
//! against the catalog, never against literal selector strings. The site
//! ships markup changes without notice, so a catalog version is expected to
//! break eventually; that risk is operational, not architectural. When it
//! happens, ship a new constructor alongside `desktop()` and leave the old
//! one for result files scraped against the old markup.

/// Named CSS locators for one version of the site's desktop markup.
#[derive(Debug, Clone)]
pub struct SelectorCatalog {
    pub site_root: &'static str,
    /// The site redirects between the bare and `www` hosts; both count as
    /// "back at the root" during checkpoint navigation.
    pub alt_site_root: &'static str,

    // Login form
    pub login_form: &'static str,
    pub login_email: &'static str,
    pub login_password: &'static str,
    pub login_submit: &'static str,
    pub cookie_banner_accept: &'static str,

    // Second-factor checkpoint
    pub checkpoint_form: &'static str,
    pub checkpoint_code_input: &'static str,
    pub checkpoint_continue: &'static str,

    /// Marker that only renders on the authenticated home feed.
    pub feed_marker: &'static str,

    // Group page
    pub group_name: &'static str,
    pub feed_container: &'static str,
    pub post_element: &'static str,

    // Post sub-fields
    pub post_author: &'static str,
    pub post_author_fallback: &'static str,
    pub post_author_avatar: &'static str,
    pub post_link: &'static str,
    pub post_content: &'static str,
    pub post_content_expand: &'static str,
    /// Attachment region when the post has a text body (its presence shifts
    /// the sibling structure).
    pub post_attachment: &'static str,
    /// Attachment region for posts without a text body.
    pub post_attachment_no_text: &'static str,
    pub post_image: &'static str,
}

impl SelectorCatalog {
    /// Current desktop markup version.
    pub fn desktop() -> Self {
        Self {
            site_root: "https://facebook.com",
            alt_site_root: "https://www.facebook.com",

            login_form: "form",
            login_email: "input#email",
            login_password: "input[type=\"password\"]",
            login_submit: "button[data-testid=\"royal_login_button\"]",
            cookie_banner_accept: "button[data-cookiebanner=\"accept_button\"]",

            checkpoint_form: "form[class*=\"checkpoint\"]",
            checkpoint_code_input: "input[name*=\"approvals_code\"]",
            checkpoint_continue: "button[id*=\"checkpointSubmitButton\"]",

            feed_marker: "div[data-pagelet=\"Stories\"]",

            group_name: "title",
            feed_container: "div[role=feed]",
            post_element: "div[role=article][aria-labelledby]",

            post_author: "h2 span a",
            post_author_fallback: "h2 strong span",
            post_author_avatar: "object image",
            post_link: "span[dir=auto] > span a",
            post_content: "div[dir=auto][class]",
            post_content_expand: "div[role=button]",
            post_attachment: "div[dir=auto][class] + div[class][id]",
            post_attachment_no_text: "div[class][id]",
            post_image: "img",
        }
    }

    /// URL of a group's feed page.
    pub fn group_url(&self, group_id: &str) -> String {
        format!(
            "{}/groups/{}/",
            self.alt_site_root.trim_end_matches('/'),
            group_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_url_uses_www_host() {
        let catalog = SelectorCatalog::desktop();
        assert_eq!(
            catalog.group_url("123456"),
            "https://www.facebook.com/groups/123456/"
        );
    }
}
