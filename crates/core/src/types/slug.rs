//! URL-safe store identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A URL-safe identifier derived from a store name.
///
/// Slugs are lowercase ASCII letters and digits separated by single hyphens,
/// with no leading or trailing hyphen. Uniqueness is the caller's concern:
/// when the base slug is taken, [`Slug::with_suffix`] produces `base-N`.
///
/// ```
/// use storedir_core::Slug;
///
/// assert_eq!(Slug::from_name("Wes's Coffee & Bakery!").as_str(), "wes-s-coffee-bakery");
/// assert_eq!(Slug::from_name("Tim Hortons").with_suffix(2).as_str(), "tim-hortons-2");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Fallback used when a name contains no ASCII letters or digits.
    pub const FALLBACK: &'static str = "store";

    /// Derive a slug from a display name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        let mut pending_separator = false;

        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_separator && !slug.is_empty() {
                    slug.push('-');
                }
                pending_separator = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_separator = true;
            }
        }

        if slug.is_empty() {
            slug.push_str(Self::FALLBACK);
        }

        Self(slug)
    }

    /// Wrap a slug read back from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Append a numeric disambiguator, e.g. `tim-hortons` -> `tim-hortons-2`.
    #[must_use]
    pub fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    /// Whether `candidate` is this slug or one of its numbered variants.
    ///
    /// Mirrors the `^base(-[0-9]+)?$` pattern used by the database query.
    #[must_use]
    pub fn is_variant(&self, candidate: &str) -> bool {
        let Some(rest) = candidate.strip_prefix(self.0.as_str()) else {
            return false;
        };

        if rest.is_empty() {
            return true;
        }

        rest.strip_prefix('-')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Regular expression matching this slug and its numbered variants.
    #[must_use]
    pub fn variant_pattern(&self) -> String {
        // Slugs only contain [a-z0-9-], none of which need escaping.
        format!("^{}(-[0-9]+)?$", self.0)
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Slug` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Slug {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Slug {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Slug {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_basic() {
        assert_eq!(Slug::from_name("Tim Hortons").as_str(), "tim-hortons");
    }

    #[test]
    fn test_from_name_collapses_punctuation() {
        assert_eq!(
            Slug::from_name("  --Pizza   &  Beer!!  ").as_str(),
            "pizza-beer"
        );
    }

    #[test]
    fn test_from_name_drops_non_ascii() {
        assert_eq!(Slug::from_name("Café Crème 24").as_str(), "caf-cr-me-24");
    }

    #[test]
    fn test_from_name_fallback() {
        assert_eq!(Slug::from_name("???").as_str(), Slug::FALLBACK);
        assert_eq!(Slug::from_name("").as_str(), Slug::FALLBACK);
    }

    #[test]
    fn test_with_suffix() {
        let slug = Slug::from_name("Bakery");
        assert_eq!(slug.with_suffix(3).as_str(), "bakery-3");
    }

    #[test]
    fn test_is_variant() {
        let slug = Slug::from_name("Bakery");
        assert!(slug.is_variant("bakery"));
        assert!(slug.is_variant("bakery-2"));
        assert!(slug.is_variant("bakery-10"));
        assert!(!slug.is_variant("bakery-"));
        assert!(!slug.is_variant("bakery-two"));
        assert!(!slug.is_variant("bakery-shop"));
        assert!(!slug.is_variant("bakeryx"));
        assert!(!slug.is_variant("the-bakery"));
    }

    #[test]
    fn test_variant_pattern() {
        let slug = Slug::from_name("Tim Hortons");
        assert_eq!(slug.variant_pattern(), "^tim-hortons(-[0-9]+)?$");
    }
}
