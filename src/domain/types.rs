//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// Editorial category a post is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tech,
    Health,
    Food,
    Education,
    Places,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Tech,
        Category::Health,
        Category::Food,
        Category::Education,
        Category::Places,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Health => "health",
            Category::Food => "food",
            Category::Education => "education",
            Category::Places => "places",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Tech => "Tech",
            Category::Health => "Health",
            Category::Food => "Food",
            Category::Education => "Education",
            Category::Places => "Places",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

/// Category selection on the post list. Unknown values select everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn parse(value: Option<&str>) -> Self {
        value
            .and_then(Category::parse)
            .map_or(CategoryFilter::All, CategoryFilter::Only)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Only(category) => category.as_str(),
        }
    }

    pub fn matches(self, category: Option<Category>) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => category == Some(wanted),
        }
    }
}

/// Ordering applied to the post list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Latest,
    Popular,
    Oldest,
}

impl SortOrder {
    /// Display order of the sort toggles.
    pub const ALL: [SortOrder; 3] = [SortOrder::Latest, SortOrder::Popular, SortOrder::Oldest];

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Latest => "latest",
            SortOrder::Popular => "popular",
            SortOrder::Oldest => "oldest",
        }
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("popular") => SortOrder::Popular,
            Some("oldest") => SortOrder::Oldest,
            _ => SortOrder::Latest,
        }
    }
}

/// Identity providers whose sign-ins are reconciled against author records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProvider {
    Github,
}

impl IdentityProvider {
    pub const SUPPORTED: [IdentityProvider; 1] = [IdentityProvider::Github];

    pub fn as_str(self) -> &'static str {
        match self {
            IdentityProvider::Github => "github",
        }
    }

    /// Exact, case-sensitive match against the provider names issued by the
    /// sign-in callbacks.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED
            .into_iter()
            .find(|provider| provider.as_str() == name)
    }
}

/// What to do with a completed sign-in from a provider outside
/// [`IdentityProvider::SUPPORTED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownProviderPolicy {
    /// Let the sign-in through without touching author records.
    #[default]
    Allow,
    Deny,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_category_selects_everything() {
        assert_eq!(CategoryFilter::parse(Some("gardening")), CategoryFilter::All);
        assert_eq!(CategoryFilter::parse(Some("all")), CategoryFilter::All);
        assert_eq!(
            CategoryFilter::parse(Some("food")),
            CategoryFilter::Only(Category::Food)
        );
    }

    #[test]
    fn provider_names_are_case_sensitive() {
        assert_eq!(
            IdentityProvider::from_name("github"),
            Some(IdentityProvider::Github)
        );
        assert_eq!(IdentityProvider::from_name("GitHub"), None);
        assert_eq!(IdentityProvider::from_name("google"), None);
    }
}
