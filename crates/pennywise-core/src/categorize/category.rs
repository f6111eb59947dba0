use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Spending category assigned to a bank transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Entertainment,
    Bills,
    Healthcare,
    Education,
    Travel,
    Groceries,
    Fuel,
    Subscriptions,
    Income,
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Healthcare,
        Category::Education,
        Category::Travel,
        Category::Groceries,
        Category::Fuel,
        Category::Subscriptions,
        Category::Income,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Bills => "bills",
            Category::Healthcare => "healthcare",
            Category::Education => "education",
            Category::Travel => "travel",
            Category::Groceries => "groceries",
            Category::Fuel => "fuel",
            Category::Subscriptions => "subscriptions",
            Category::Income => "income",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>(), Ok(category));
        }
        assert!("misc".parse::<Category>().is_err());
        assert_eq!(" Bills ".parse::<Category>(), Ok(Category::Bills));
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Category::Subscriptions).unwrap(), "\"subscriptions\"");
    }
}
