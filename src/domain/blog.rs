//! Blog content as served by the upstream content API.

use serde::{Deserialize, Serialize};

use crate::cache::RouteParams;

const DEFAULT_CATEGORY: &str = "thoughts";

/// One entry of an upstream directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingItem {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub object: Option<ListingObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingObject {
    #[serde(default)]
    pub properties: Option<PostProperties>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostProperties {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub name: String,
    pub category: String,
    pub title: String,
    pub description: String,
    /// ISO-8601 timestamp as published upstream.
    pub created_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Rendered HTML body; only present on single-post reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl BlogPost {
    pub fn href(&self) -> String {
        format!("/blog/{}/{}", self.category, self.name)
    }

    /// Route parameters addressing this post.
    pub fn route_params(&self) -> RouteParams {
        RouteParams::from([
            ("category".to_string(), self.category.clone()),
            ("name".to_string(), self.name.clone()),
        ])
    }

    /// Build a post from a listing item whose path is `category/name`.
    ///
    /// Returns `None` for directories and items missing metadata.
    pub fn from_listing(item: &ListingItem) -> Option<Self> {
        if item.is_dir {
            return None;
        }

        let mut segments = item.path.trim_start_matches('/').split('/');
        let (category, name) = match (segments.next(), segments.next(), segments.next()) {
            (Some(category), Some(name), None) if !name.is_empty() => (category, name),
            (Some(name), None, None) if !name.is_empty() => (DEFAULT_CATEGORY, name),
            _ => return None,
        };

        Self::from_object(category, name, item.object.as_ref()?)
    }

    pub(crate) fn from_object(category: &str, name: &str, object: &ListingObject) -> Option<Self> {
        let properties = object.properties.as_ref()?;
        let created_at = object.created_at.clone()?;

        Some(Self {
            name: name.to_string(),
            category: category.to_string(),
            title: properties.title.clone(),
            description: properties.description.clone(),
            created_at,
            tags: properties.tags.clone(),
            content: None,
        })
    }
}

/// Published posts from a deep listing, newest first.
pub fn posts_from_listing(items: &[ListingItem]) -> Vec<BlogPost> {
    let mut posts: Vec<BlogPost> = items.iter().filter_map(BlogPost::from_listing).collect();
    // ISO-8601 timestamps order lexicographically.
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}
