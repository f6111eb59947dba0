use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::categorize::{categorize, Category};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub merchant: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub booked_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategorizedTransaction {
    #[serde(flatten)]
    pub transaction: BankTransaction,
    pub category: Category,
}

impl BankTransaction {
    pub fn category(&self) -> Category {
        categorize(&self.description, self.merchant.as_deref())
    }

    pub fn into_categorized(self) -> CategorizedTransaction {
        let category = self.category();
        CategorizedTransaction {
            transaction: self,
            category,
        }
    }
}
