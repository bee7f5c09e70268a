//! Error types for term catalog construction

/// Errors raised while compiling a [`TermCatalog`](crate::TermCatalog)
///
/// These are configuration defects: they surface once at startup and never
/// per prompt.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Category declared without a name
    #[error("moderation category name must not be empty")]
    EmptyCategoryName,

    /// Category declared without terms
    #[error("moderation category '{0}' has no terms")]
    NoTerms(String),

    /// Blank term inside a category
    #[error("moderation category '{category}' contains an empty term")]
    EmptyTerm { category: String },

    /// Same category name declared twice
    #[error("duplicate moderation category: '{0}'")]
    DuplicateCategory(String),

    /// Term would match the redaction placeholder itself
    #[error("term '{term}' in category '{category}' collides with the redaction placeholder")]
    PlaceholderCollision { category: String, term: String },

    /// Compiled pattern rejected by the regex engine
    #[error("invalid pattern for category '{category}': {source}")]
    Pattern {
        category: String,
        #[source]
        source: regex::Error,
    },
}
