//! Client for the hosting platform's public API: the project directory
//! used to gate conversions and the tip-comment feed backing redemption.

use anyhow::{Context, Result};
use coinworks_ledger::{ProjectDirectory, TipEvent, TipFeed};
use serde::Deserialize;

pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            project_id: project_id.into(),
        }
    }
}

#[derive(Deserialize)]
struct ProjectsPage {
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Deserialize)]
struct ProjectEntry {
    project: ProjectInfo,
}

#[derive(Deserialize)]
struct ProjectInfo {
    visibility: String,
}

impl ProjectDirectory for PlatformClient {
    async fn has_public_project(&self, username: &str) -> Result<bool> {
        let url = format!(
            "{}/api/v1/users/{username}/projects?first=20",
            self.base_url
        );
        let page: ProjectsPage = self
            .http
            .get(&url)
            .send()
            .await
            .context("project listing request failed")?
            .error_for_status()
            .context("project listing returned an error status")?
            .json()
            .await
            .context("malformed project listing")?;
        Ok(page
            .projects
            .iter()
            .any(|entry| entry.project.visibility == "public"))
    }
}

#[derive(Deserialize)]
struct CommentsPage {
    comments: CommentList,
}

#[derive(Deserialize)]
struct CommentList {
    #[serde(default)]
    data: Vec<CommentEntry>,
}

#[derive(Deserialize)]
struct CommentEntry {
    comment: Comment,
}

#[derive(Deserialize)]
struct Comment {
    id: String,
    author: Author,
    created_at: String,
    card_data: Option<CardData>,
}

#[derive(Deserialize)]
struct Author {
    username: String,
}

#[derive(Deserialize)]
struct CardData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    credits_spent: u64,
}

impl TipFeed for PlatformClient {
    async fn recent_tips(&self) -> Result<Vec<TipEvent>> {
        let url = format!(
            "{}/api/v1/projects/{}/comments?only_tips=true&first=25",
            self.base_url, self.project_id
        );
        let page: CommentsPage = self
            .http
            .get(&url)
            .send()
            .await
            .context("tip feed request failed")?
            .error_for_status()
            .context("tip feed returned an error status")?
            .json()
            .await
            .context("malformed tip feed")?;
        Ok(page
            .comments
            .data
            .into_iter()
            .filter_map(|entry| {
                let comment = entry.comment;
                let card = comment.card_data?;
                if card.kind != "tip_comment" {
                    return None;
                }
                Some(TipEvent {
                    id: comment.id,
                    payer: comment.author.username,
                    credits_spent: card.credits_spent,
                    created_at: comment.created_at,
                })
            })
            .collect())
    }
}
