//! Catalog content models.
//!
//! A section's items are all of one kind, named by the section's
//! `content_type`. Sections decode into a [`SectionContent`] tagged union
//! rather than one record with every field optional, so an unknown kind or
//! a malformed item fails decoding instead of silently producing blanks.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// One page of the home screen.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HomeSectionsResponse {
    /// Sections in server order.
    pub sections: Vec<HomeSection>,
    /// Paging information.
    pub pagination: Pagination,
}

/// Search results, shaped like home sections.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResults {
    /// Result sections.
    #[serde(default)]
    pub sections: Vec<HomeSection>,
    /// Paging information, absent for single-page results.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl SearchResults {
    /// No results.
    pub fn empty() -> Self {
        Self {
            sections: Vec::new(),
            pagination: None,
        }
    }

    /// Whether there is nothing to show.
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.content.is_empty())
    }
}

/// Paging cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Path of the next page, if any.
    #[serde(default)]
    pub next_page: Option<String>,
    /// Total number of pages.
    #[serde(deserialize_with = "flex_u32")]
    pub total_pages: u32,
    /// Page this response holds.
    #[serde(default, deserialize_with = "flex_opt_u32")]
    pub current_page: Option<u32>,
}

impl Pagination {
    /// Whether another page can be requested.
    pub fn has_more(&self) -> bool {
        match self.current_page {
            Some(current) => current < self.total_pages,
            None => self.next_page.is_some(),
        }
    }
}

/// How a section is laid out on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionLayout {
    /// Grid of squares.
    Square,
    /// Large squares, horizontally scrolling.
    BigSquare,
    /// Two rows, horizontally scrolling.
    #[serde(rename = "2_lines_grid")]
    TwoLinesGrid,
    /// Queue-style list.
    Queue,
    /// A layout this client does not know.
    #[serde(other)]
    Unknown,
}

/// Kind of items in a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Podcast shows.
    Podcast,
    /// Podcast episodes.
    Episode,
    /// Audiobooks.
    #[serde(alias = "audiobook")]
    AudioBook,
    /// Narrated articles.
    #[serde(alias = "article")]
    AudioArticle,
}

/// A home screen section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSection")]
pub struct HomeSection {
    /// Title shown above the section.
    pub name: String,
    /// Layout hint.
    pub layout: SectionLayout,
    /// Position on screen.
    pub order: u32,
    /// Items, all of one kind.
    pub content: SectionContent,
}

/// Items of one section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    /// Podcast shows.
    Podcasts(Vec<Podcast>),
    /// Podcast episodes.
    Episodes(Vec<Episode>),
    /// Audiobooks.
    Audiobooks(Vec<Audiobook>),
    /// Narrated articles.
    Articles(Vec<Article>),
}

impl SectionContent {
    /// Kind of the items.
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Podcasts(_) => ContentKind::Podcast,
            Self::Episodes(_) => ContentKind::Episode,
            Self::Audiobooks(_) => ContentKind::AudioBook,
            Self::Articles(_) => ContentKind::AudioArticle,
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        match self {
            Self::Podcasts(items) => items.len(),
            Self::Episodes(items) => items.len(),
            Self::Audiobooks(items) => items.len(),
            Self::Articles(items) => items.len(),
        }
    }

    /// Whether the section has no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct RawSection {
    name: String,
    #[serde(rename = "type")]
    layout: SectionLayout,
    content_type: ContentKind,
    #[serde(deserialize_with = "flex_u32")]
    order: u32,
    #[serde(default)]
    content: Vec<serde_json::Value>,
}

/// A section whose items do not match its `content_type`.
#[derive(Debug)]
pub struct SectionError {
    section: String,
    kind: ContentKind,
    source: serde_json::Error,
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "section {:?}: items are not {:?}: {}",
            self.section, self.kind, self.source
        )
    }
}

impl std::error::Error for SectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl TryFrom<RawSection> for HomeSection {
    type Error = SectionError;

    fn try_from(raw: RawSection) -> Result<Self, Self::Error> {
        fn items<T: de::DeserializeOwned>(
            values: Vec<serde_json::Value>,
        ) -> serde_json::Result<Vec<T>> {
            values.into_iter().map(serde_json::from_value).collect()
        }

        let content = match raw.content_type {
            ContentKind::Podcast => items(raw.content).map(SectionContent::Podcasts),
            ContentKind::Episode => items(raw.content).map(SectionContent::Episodes),
            ContentKind::AudioBook => items(raw.content).map(SectionContent::Audiobooks),
            ContentKind::AudioArticle => items(raw.content).map(SectionContent::Articles),
        }
        .map_err(|source| SectionError {
            section: raw.name.clone(),
            kind: raw.content_type,
            source,
        })?;

        Ok(Self {
            name: raw.name,
            layout: raw.layout,
            order: raw.order,
            content,
        })
    }
}

/// A podcast show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Podcast {
    /// Identifier.
    #[serde(deserialize_with = "flex_string")]
    pub podcast_id: String,
    /// Title.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Cover art.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Number of episodes.
    #[serde(default, deserialize_with = "flex_opt_u32")]
    pub episode_count: Option<u32>,
    /// Total length in seconds.
    #[serde(default, deserialize_with = "flex_opt_u32")]
    pub duration: Option<u32>,
    /// Language code.
    #[serde(default)]
    pub language: Option<String>,
    /// Ranking score.
    #[serde(default)]
    pub score: Option<f64>,
}

/// A podcast episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Identifier.
    #[serde(deserialize_with = "flex_string")]
    pub episode_id: String,
    /// Title.
    pub name: String,
    /// Show the episode belongs to.
    #[serde(default)]
    pub podcast_name: Option<String>,
    /// Host or author.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Cover art.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Audio stream.
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Length in seconds.
    #[serde(default, deserialize_with = "flex_opt_u32")]
    pub duration: Option<u32>,
    /// Publication date, as sent by the server.
    #[serde(default)]
    pub release_date: Option<String>,
}

/// An audiobook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audiobook {
    /// Identifier.
    #[serde(deserialize_with = "flex_string")]
    pub audiobook_id: String,
    /// Title.
    pub name: String,
    /// Author.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Cover art.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Length in seconds.
    #[serde(default, deserialize_with = "flex_opt_u32")]
    pub duration: Option<u32>,
    /// Language code.
    #[serde(default)]
    pub language: Option<String>,
    /// Publication date, as sent by the server.
    #[serde(default)]
    pub release_date: Option<String>,
}

/// A narrated article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Identifier.
    #[serde(deserialize_with = "flex_string")]
    pub article_id: String,
    /// Headline.
    pub name: String,
    /// Author.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Illustration.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Length in seconds.
    #[serde(default, deserialize_with = "flex_opt_u32")]
    pub duration: Option<u32>,
    /// Publication date, as sent by the server.
    #[serde(default)]
    pub release_date: Option<String>,
}

// The backend is inconsistent about quoting numbers.

#[derive(Deserialize)]
#[serde(untagged)]
enum Flex {
    Number(u64),
    Text(String),
}

fn flex_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = match Flex::deserialize(deserializer)? {
        Flex::Number(n) => n,
        Flex::Text(s) => s.trim().parse().map_err(de::Error::custom)?,
    };
    u32::try_from(value).map_err(de::Error::custom)
}

fn flex_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<Flex>::deserialize(deserializer)?
        .map(|flex| match flex {
            Flex::Number(n) => u32::try_from(n).map_err(de::Error::custom),
            Flex::Text(s) => s.trim().parse().map_err(de::Error::custom),
        })
        .transpose()
}

fn flex_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Flex::deserialize(deserializer)? {
        Flex::Number(n) => n.to_string(),
        Flex::Text(s) => s,
    })
}
