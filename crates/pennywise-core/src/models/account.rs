use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BillPreferences {
    #[serde(default)]
    pub reminders_enabled: bool,
    /// Days before the due date to send a reminder
    #[serde(default)]
    pub reminder_days_before: u32,
    #[serde(default)]
    pub auto_detect_bills: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
}

impl Goal {
    /// Progress toward the target as a percentage, capped at 100
    pub fn progress_percent(&self) -> f64 {
        if self.target_amount <= 0.0 {
            return 100.0;
        }
        (self.current_amount / self.target_amount * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut profile: Profile =
            serde_json::from_str(r#"{"id":"u1","email":"sam@example.com"}"#).unwrap();
        assert_eq!(profile.display_name(), "sam@example.com");

        profile.first_name = Some("Sam".to_string());
        assert_eq!(profile.display_name(), "Sam");
    }

    #[test]
    fn test_goal_progress_is_capped() {
        let goal = Goal {
            id: "g".to_string(),
            name: "Holiday".to_string(),
            target_amount: 200.0,
            current_amount: 300.0,
            deadline: None,
        };
        assert_eq!(goal.progress_percent(), 100.0);

        let half = Goal { current_amount: 100.0, ..goal };
        assert_eq!(half.progress_percent(), 50.0);
    }
}
