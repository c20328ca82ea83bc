use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::config::SelectorSection;
use crate::users::DomEntry;

use super::automation::{navigate, BrowserContext};
use super::dispatcher::ActionSurface;
use super::error::{BrowserError, BrowserResult};
use super::scanner::ScanSurface;

/// A live tab driven through page scripts.
#[derive(Debug, Clone)]
pub struct PageSurface {
    page: Page,
    selectors: SelectorSection,
    base_url: String,
    navigation_timeout: Duration,
}

impl PageSurface {
    pub fn new(context: &BrowserContext, selectors: SelectorSection, base_url: &str) -> Self {
        Self {
            page: context.page().clone(),
            selectors,
            base_url: base_url.trim_end_matches('/').to_string(),
            navigation_timeout: context.navigation_timeout(),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn following_url(&self, screen_name: &str) -> String {
        format!("{}/{}/following", self.base_url, screen_name)
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> BrowserResult<T> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Script)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?
            .into_value::<T>()
            .map_err(|err| BrowserError::Script(format!("unexpected script result: {err}")))
    }

    fn identity_script(&self) -> String {
        format!(
            r#"
(() => {{
    const links = document.querySelectorAll('nav a[role="link"]');
    for (const link of links) {{
        const href = link.getAttribute('href') || '';
        if (/^\/[A-Za-z0-9_]+$/.test(href) && link.querySelector({avatar})) {{
            return href.slice(1);
        }}
    }}
    const profile = document.querySelector({profile});
    if (profile) {{
        const href = profile.getAttribute('href') || '';
        if (href.length > 1) return href.slice(1);
    }}
    const match = window.location.pathname.match(/^\/([A-Za-z0-9_]+)\/following/);
    return match ? match[1] : null;
}})()
"#,
            avatar = js_string(&self.selectors.avatar_image),
            profile = js_string(&self.selectors.profile_link),
        )
    }

    fn snapshot_script(&self) -> String {
        let selectors = &self.selectors;
        format!(
            r#"
(() => {{
    const badges = {badges};
    const entries = [];
    for (const cell of document.querySelectorAll({cell})) {{
        const link = cell.querySelector({link});
        if (!link) continue;
        const href = link.getAttribute('href') || '';
        if (!/^\/[A-Za-z0-9_]+$/.test(href)) continue;
        const nameEl = cell.querySelector({name});
        const avatarEl = cell.querySelector({avatar});
        entries.push({{
            screenName: href.slice(1),
            name: nameEl ? (nameEl.textContent || '').trim() : null,
            avatar: avatarEl ? avatarEl.src : null,
            isFollowingYou: !!cell.querySelector({follows_you}),
            isBlueVerified: badges.some((selector) => !!cell.querySelector(selector)),
        }});
    }}
    return entries;
}})()
"#,
            badges = js_strings(&selectors.verified_badges),
            cell = js_string(&selectors.user_cell),
            link = js_string(&selectors.cell_link),
            name = js_string(&selectors.cell_name),
            avatar = js_string(&selectors.avatar_image),
            follows_you = js_string(&selectors.follows_you_indicator),
        )
    }
}

#[async_trait(?Send)]
impl ScanSurface for PageSurface {
    async fn current_identity(&mut self) -> BrowserResult<Option<String>> {
        self.eval(self.identity_script()).await
    }

    async fn open_following(&mut self, screen_name: &str) -> BrowserResult<()> {
        let url = self.following_url(screen_name);
        let current = self.page.url().await?.unwrap_or_default();
        if current.trim_end_matches('/').eq_ignore_ascii_case(&url) {
            return Ok(());
        }
        navigate(&self.page, &url, self.navigation_timeout).await
    }

    async fn snapshot(&mut self) -> BrowserResult<Vec<DomEntry>> {
        let entries: Vec<DomEntry> = self.eval(self.snapshot_script()).await?;
        trace!(entries = entries.len(), "dom snapshot");
        Ok(entries)
    }

    async fn advance(&mut self) -> BrowserResult<()> {
        self.eval::<serde_json::Value>(
            "(() => { window.scrollTo(0, document.body.scrollHeight); return null; })()"
                .to_string(),
        )
        .await?;
        Ok(())
    }

    async fn content_height(&mut self) -> BrowserResult<u64> {
        self.eval("document.body.scrollHeight".to_string()).await
    }
}

#[async_trait(?Send)]
impl ActionSurface for PageSurface {
    async fn cookie(&self, name: &str) -> BrowserResult<Option<String>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value))
    }

    async fn post_form(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> BrowserResult<u16> {
        let header_map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect();
        let script = format!(
            r#"
(async () => {{
    try {{
        const response = await fetch({url}, {{
            method: 'POST',
            headers: {headers},
            credentials: 'include',
            body: {body},
        }});
        return response.status;
    }} catch (_) {{
        return 0;
    }}
}})()
"#,
            url = js_string(url),
            headers = serde_json::Value::Object(header_map),
            body = js_string(body),
        );
        self.eval(script).await
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.page
            .url()
            .await?
            .ok_or_else(|| BrowserError::Script("page has no url".to_string()))
    }

    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        navigate(&self.page, url, self.navigation_timeout).await
    }

    async fn click_in_entry(
        &self,
        screen_name: &str,
        selectors: &[String],
    ) -> BrowserResult<bool> {
        let script = format!(
            r#"
(() => {{
    const wanted = '/' + {screen_name}.toLowerCase();
    const controls = {controls};
    for (const cell of document.querySelectorAll({cell})) {{
        const links = Array.from(cell.querySelectorAll('a[href]'));
        if (!links.some((a) => (a.getAttribute('href') || '').toLowerCase() === wanted)) continue;
        for (const selector of controls) {{
            const control = cell.querySelector(selector);
            if (control) {{
                control.click();
                return true;
            }}
        }}
    }}
    return false;
}})()
"#,
            screen_name = js_string(screen_name),
            controls = js_strings(selectors),
            cell = js_string(&self.selectors.user_cell),
        );
        self.eval(script).await
    }

    async fn click_first(&self, selectors: &[String]) -> BrowserResult<bool> {
        let script = format!(
            r#"
(() => {{
    for (const selector of {selectors}) {{
        const control = document.querySelector(selector);
        if (control) {{
            control.click();
            return true;
        }}
    }}
    return false;
}})()
"#,
            selectors = js_strings(selectors),
        );
        self.eval(script).await
    }
}

/// JSON string literals are valid JavaScript string literals.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn js_strings(values: &[String]) -> String {
    serde_json::Value::from(values.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_literals_escape_quotes() {
        assert_eq!(
            js_string(r#"[data-testid="UserCell"]"#),
            r#""[data-testid=\"UserCell\"]""#
        );
        assert_eq!(
            js_strings(&["a".to_string(), "b'c".to_string()]),
            r#"["a","b'c"]"#
        );
    }
}
