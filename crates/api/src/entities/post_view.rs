use anyhow::anyhow;
use chrono::{DateTime, Utc};
use db::{
    models::Post,
    types::{DbId, VoteDirection},
};
use futures::future::join_all;
use serde::Serialize;

use crate::loaders::Loaders;

use super::Account;

const SNIPPET_CHARS: usize = 50;

#[derive(Serialize, Debug)]
pub struct PostView {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Enough of the body for a feed card without shipping the whole text.
    pub text_snippet: String,
    pub points: i32,
    /// The viewer's own vote on this post, absent when they haven't voted
    /// (or aren't signed in).
    pub vote_status: Option<VoteDirection>,
    pub author: Account,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl PostView {
    /// Resolves the author and the viewer's vote through the request's
    /// loaders, so a whole page of views costs one user query and one vote
    /// query no matter how long the page is.
    pub async fn build(
        post: Post,
        viewer: Option<&DbId>,
        loaders: &Loaders,
    ) -> anyhow::Result<Self> {
        let author = loaders
            .users
            .load(post.author.clone())
            .await?
            .ok_or_else(|| anyhow!("post author is gone"))?;

        let vote_status = match viewer {
            Some(viewer) => loaders
                .votes
                .load((post.id.clone(), viewer.clone()))
                .await?,
            None => None,
        };

        Ok(PostView {
            id: post.id.to_string(),
            text_snippet: snippet(&post.content),
            title: post.title,
            content: post.content,
            points: post.points,
            vote_status: vote_status.and_then(VoteDirection::from_value),
            author: Account::build(author, viewer),
            created_at: post.published,
            edited_at: post.updated,
        })
    }

    pub async fn build_from_vec(
        posts: Vec<Post>,
        viewer: Option<&DbId>,
        loaders: &Loaders,
    ) -> anyhow::Result<Vec<Self>> {
        join_all(
            posts
                .into_iter()
                .map(|post| async move { Self::build(post, viewer, loaders).await }),
        )
        .await
        .into_iter()
        .collect()
    }
}

fn snippet(content: &str) -> String {
    content.chars().take(SNIPPET_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::snippet;

    #[test]
    fn snippet_truncates_on_char_boundaries() {
        assert_eq!(snippet("short"), "short");

        let long = "a".repeat(80);
        assert_eq!(snippet(&long).len(), 50);

        // Multi-byte characters count as one, not as bytes.
        let cyrillic = "я".repeat(80);
        assert_eq!(snippet(&cyrillic).chars().count(), 50);
    }
}
