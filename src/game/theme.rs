//! Map themes and their concealment object pools

use std::fmt;
use std::str::FromStr;

/// Map theme, selects the object-type vocabulary of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Theme {
    #[default]
    School,
    Construction,
    City,
}

/// Theme tag to ordered object-type labels
const OBJECT_POOLS: &[(Theme, &[&str])] = &[
    (
        Theme::School,
        &["CHAIR", "TABLE", "BROWNCLEANER", "FIRESTOP", "TRASH", "WHITECLEANER"],
    ),
    (
        Theme::Construction,
        &["BOX", "CIRCLEBOX", "CON", "TIRE", "BRICK", "FENCE"],
    ),
    (
        Theme::City,
        &[
            "CON",
            "OLDMAN",
            "BLUEMAN",
            "BLUE_CAR_H",
            "BLUE_CAR_V",
            "LIGHT",
            "RED_CAR_H",
            "RED_CAR_V",
            "TIRE",
            "TRASH",
            "WALKMAN",
            "WALKWOMAN",
            "WOMAN",
        ],
    ),
];

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::School, Theme::Construction, Theme::City];

    /// Object types that may be placed or worn as a disguise under this theme
    pub fn object_pool(self) -> &'static [&'static str] {
        OBJECT_POOLS
            .iter()
            .find(|(theme, _)| *theme == self)
            .map(|(_, pool)| *pool)
            .unwrap_or(&[])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::School => "SCHOOL",
            Theme::Construction => "CONSTRUCTION",
            Theme::City => "CITY",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown theme: {0}")]
pub struct UnknownTheme(pub String);

impl FromStr for Theme {
    type Err = UnknownTheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Theme::ALL
            .into_iter()
            .find(|theme| theme.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| UnknownTheme(tag.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_theme_has_a_pool() {
        for theme in Theme::ALL {
            assert!(!theme.object_pool().is_empty(), "{theme} has no objects");
        }
        assert_eq!(Theme::City.object_pool().len(), 13);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("city".parse::<Theme>().unwrap(), Theme::City);
        assert_eq!(" Construction ".parse::<Theme>().unwrap(), Theme::Construction);
        assert!("BEACH".parse::<Theme>().is_err());
    }
}
