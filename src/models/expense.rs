use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{ApiError, FieldErrors};

/// The fixed set of expense categories. Matching is exact and
/// case-sensitive; anything else is a validation failure.
pub const EXPENSE_CATEGORIES: [&str; 9] = [
    "Food",
    "Transportation",
    "Housing",
    "Utilities",
    "Entertainment",
    "Healthcare",
    "Shopping",
    "Education",
    "Other",
];

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub item: String,
    pub amount: Decimal,
    pub recorded_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-category aggregate used by the stats endpoint.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCategoryTotal {
    pub category: String,
    pub total: Decimal,
    pub count: i64,
}

/// One day of the rolling 7-day window.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDailyTotal {
    pub date: NaiveDate,
    pub total: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateExpenseRequest {
    pub category: String,
    pub item: String,
    pub amount: Decimal,
    pub recorded_date: String,
}

impl CreateExpenseRequest {
    pub fn validate(&self) -> Result<ExpenseDraft, ApiError> {
        validate_fields(&self.category, &self.item, self.amount, &self.recorded_date)
    }
}

/// Full-record replace: every field has to be supplied and re-validated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateExpenseRequest {
    pub category: String,
    pub item: String,
    pub amount: Decimal,
    pub recorded_date: String,
}

impl UpdateExpenseRequest {
    pub fn validate(&self) -> Result<ExpenseDraft, ApiError> {
        validate_fields(&self.category, &self.item, self.amount, &self.recorded_date)
    }
}

/// An expense payload that passed validation.
#[derive(Debug)]
pub struct ExpenseDraft {
    pub category: String,
    pub item: String,
    pub amount: Decimal,
    pub recorded_date: NaiveDate,
}

fn validate_fields(
    category: &str,
    item: &str,
    amount: Decimal,
    recorded_date: &str,
) -> Result<ExpenseDraft, ApiError> {
    let mut errors = FieldErrors::new();

    if !EXPENSE_CATEGORIES.contains(&category) {
        errors.insert(
            "category",
            format!("'{category}' is not a valid expense category."),
        );
    }
    if item.trim().is_empty() {
        errors.insert("item", "Item is required.".to_string());
    }
    if amount < Decimal::ZERO {
        errors.insert("amount", "Amount must be zero or greater.".to_string());
    }
    let recorded_date = match NaiveDate::parse_from_str(recorded_date, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.insert(
                "recordedDate",
                "Date must use the YYYY-MM-DD format.".to_string(),
            );
            None
        }
    };

    match (errors.is_empty(), recorded_date) {
        (true, Some(recorded_date)) => Ok(ExpenseDraft {
            category: category.to_string(),
            item: item.trim().to_string(),
            amount,
            recorded_date,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateExpenseRequest {
        CreateExpenseRequest {
            category: "Food".to_string(),
            item: "Groceries".to_string(),
            amount: Decimal::new(5000, 2),
            recorded_date: "2024-05-01".to_string(),
        }
    }

    #[test]
    fn complete_input_passes() {
        let draft = request().validate().unwrap();
        assert_eq!(draft.category, "Food");
        assert_eq!(draft.recorded_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut request = request();
        request.category = "Snacks".to_string();

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains_key("category")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn category_matching_is_case_sensitive() {
        let mut request = request();
        request.category = "food".to_string();

        assert!(request.validate().is_err());
    }

    #[test]
    fn negative_amount_is_rejected() {
        let mut request = request();
        request.amount = Decimal::new(-1, 0);

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains_key("amount")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn zero_amount_is_allowed() {
        let mut request = request();
        request.amount = Decimal::ZERO;

        assert!(request.validate().is_ok());
    }

    #[test]
    fn malformed_date_is_rejected() {
        let mut request = request();
        request.recorded_date = "01/05/2024".to_string();

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert!(errors.contains_key("recordedDate")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn all_failures_are_collected() {
        let request = CreateExpenseRequest {
            category: "Snacks".to_string(),
            item: "  ".to_string(),
            amount: Decimal::new(-1, 0),
            recorded_date: "yesterday".to_string(),
        };

        match request.validate().unwrap_err() {
            ApiError::Validation(errors) => assert_eq!(errors.len(), 4),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_body_fields_fail_closed() {
        let result = serde_json::from_value::<CreateExpenseRequest>(serde_json::json!({
            "category": "Food",
            "item": "Groceries",
            "amount": 50,
            "recordedDate": "2024-05-01",
            "note": "unexpected",
        }));

        assert!(result.is_err());
    }

    #[test]
    fn expense_serializes_camel_case() {
        let expense = Expense {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            category: "Food".to_string(),
            item: "Groceries".to_string(),
            amount: Decimal::new(5000, 2),
            recorded_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&expense).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("recordedDate").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
