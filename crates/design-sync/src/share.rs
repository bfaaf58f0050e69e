//! Share links: how a project id travels between users.
//!
//! A link is any URL carrying a `project` query parameter, plus `mode=view`
//! for read-only links:
//!
//! ```text
//! https://app.example/editor?project=p-abc123&mode=view
//! ```

use design_sync_core::ProjectId;
use url::Url;

use crate::config::EditMode;
use crate::error::{Result, SessionError};

/// Origin used to resolve path-only links such as `/editor?project=..`.
const PATH_ONLY_ORIGIN: &str = "http://localhost/";

/// A parsed share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub project: ProjectId,
    pub mode: EditMode,
}

impl ShareLink {
    pub fn new(project: ProjectId, mode: EditMode) -> Self {
        Self { project, mode }
    }

    /// Extract the project id and mode from a URL.
    ///
    /// Only the query counts; a fragment is never read. Unknown parameters
    /// are ignored. Any `mode` other than `view` means edit.
    pub fn parse(link: &str) -> Result<Self> {
        let url = resolve(link)?;
        if url.query().is_none() {
            return Err(SessionError::InvalidShareLink("no query string".into()));
        }

        let mut project = None;
        let mut mode = EditMode::Edit;
        for (key, value) in url.query_pairs() {
            match &*key {
                "project" => project = Some(value.into_owned()),
                "mode" if value == "view" => mode = EditMode::View,
                _ => {}
            }
        }

        let project = project
            .ok_or_else(|| SessionError::InvalidShareLink("missing project parameter".into()))?;
        Ok(Self {
            project: ProjectId::parse(project)?,
            mode,
        })
    }

    /// Build a link on top of `base`, keeping its other query parameters and
    /// its fragment. An existing `project` or `mode` is replaced.
    pub fn to_url(&self, base: &Url) -> Url {
        let kept: Vec<(String, String)> = base
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| key != "project" && key != "mode")
            .collect();

        let mut url = base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear().extend_pairs(kept);
            pairs.append_pair("project", self.project.as_str());
            if self.mode == EditMode::View {
                pairs.append_pair("mode", "view");
            }
        }
        url
    }
}

fn resolve(link: &str) -> Result<Url> {
    match Url::parse(link) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(Url::parse(PATH_ONLY_ORIGIN)?.join(link)?)
        }
        parsed => Ok(parsed?),
    }
}
