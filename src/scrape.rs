//! Last published semester, scraped from the course-schedules page.
//!
//! The page links every published schedule PDF through the downloads
//! endpoint. The first such link carries the newest term:
//!
//! ```html
//! <a href="https://.../registrar_downloads/json?method=printDocument&name=school_schedule_by_term&termid=701">
//!   Spring 2025
//! </a>
//! ```

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::catalog::Entity;
use crate::client::RegistrarClient;
use crate::document::ExtractError;
use crate::error::Result;

/// `termid` of a schedule download link, if `href` is one.
fn download_termid(base: Option<&Url>, href: &str) -> Option<String> {
    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    let mut is_print = false;
    let mut termid = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            "method" => is_print = value == "printDocument",
            "termid" if !value.trim().is_empty() => termid = Some(value.trim().to_string()),
            _ => {}
        }
    }
    termid.filter(|_| is_print)
}

/// Find the first schedule download link in `html`.
///
/// `base_url` resolves relative links. The anchor text, whitespace
/// collapsed, becomes the semester name.
pub fn parse_last_published_semester(html: &str, base_url: &str) -> Result<Entity> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]")
        .map_err(|e| ExtractError::Markup(format!("invalid selector: {e:?}")))?;
    let base = Url::parse(base_url).ok();

    document
        .select(&anchors)
        .find_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let id = download_termid(base.as_ref(), href)?;
            let name = anchor.text().collect::<Vec<_>>().join(" ");
            let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(Entity::new(id, name))
        })
        .ok_or_else(|| ExtractError::NoPublishedSemester.into())
}

impl RegistrarClient {
    /// The semester whose schedule the registrar most recently published.
    ///
    /// May differ from [`latest_semester`](Self::latest_semester), which
    /// also counts terms the catalog knows but has not published yet.
    #[instrument(skip(self))]
    pub async fn last_published_semester(&self) -> Result<Entity> {
        let url = &self.config().schedules_url;
        let response = self.get(url, &[]).await?;
        let semester = parse_last_published_semester(&response.text(), &response.url)?;
        debug!(id = %semester.id, name = %semester.name, "Found published semester");
        Ok(semester)
    }
}
